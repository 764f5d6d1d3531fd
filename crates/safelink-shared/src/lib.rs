//! # safelink-shared
//!
//! Domain types shared by the SafeLink store and server crates: alert
//! lifecycle, trusted contacts, community reports, geospatial helpers, the
//! real-time event envelope and signed session tokens.

pub mod alert;
pub mod constants;
pub mod contact;
pub mod error;
pub mod events;
pub mod geo;
pub mod report;
pub mod session;
pub mod types;
pub mod validation;

pub use alert::{Alert, AlertCategory, AlertStatus, Location, LocationSample, NewAlert};
pub use contact::{NewContact, TrustedContact};
pub use error::{Result, SafelinkError};
pub use events::{
    ChannelKind, FanOutSummary, NotificationAttempt, NotificationTarget, RealtimeEvent, Room,
};
pub use geo::{BoundingBox, GeoPoint, Geolocated, Nearby, NearbyQuery};
pub use report::{NewReport, Report, ReportCategory, ReportStatus};
pub use types::{AlertId, ContactId, Page, Paginated, Pagination, Principal, ReportId, Role, UserId};
pub use validation::{ValidationErrors, Validator, Violation};
