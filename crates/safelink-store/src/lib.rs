//! # safelink-store
//!
//! Persistence for SafeLink: a SQLite database holding alerts, their location
//! trails, trusted contacts and community reports, exposed through the
//! [`AlertStore`], [`ContactDirectory`] and [`ReportStore`] traits.
//!
//! [`Database`] is the synchronous handle with typed CRUD helpers;
//! [`SqliteStore`] wraps it for async callers. [`MemoryStore`] implements the
//! same traits in memory.

pub mod alerts;
pub mod contacts;
pub mod database;
pub mod memory;
pub mod migrations;
pub mod reports;
pub mod sqlite;
pub mod traits;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AlertStore, ContactDirectory, ReportFilter, ReportStore};
