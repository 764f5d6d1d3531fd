use rusqlite::ErrorCode;
use safelink_shared::SafelinkError;
use thiserror::Error;

/// Errors produced by the SQLite layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored value could not be decoded back into its domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// JSON column encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the same operation can succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DiskFull
                    | ErrorCode::CannotOpen
                    | ErrorCode::OutOfMemory
            ),
            StoreError::Io(_) => true,
            StoreError::Sqlite(_)
            | StoreError::Migration(_)
            | StoreError::Corrupt(_)
            | StoreError::Json(_) => false,
        }
    }
}

/// The domain never sees rusqlite types. Busy or unavailable databases are
/// retryable; everything else is a hard store failure.
impl From<StoreError> for SafelinkError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            SafelinkError::TransientStore(err.to_string())
        } else {
            SafelinkError::StoreFailure(err.to_string())
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite(code: i32) -> StoreError {
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn busy_database_is_retryable() {
        let err: SafelinkError = sqlite(rusqlite::ffi::SQLITE_BUSY).into();
        assert!(matches!(err, SafelinkError::TransientStore(_)));
    }

    #[test]
    fn corruption_and_migrations_are_not_retryable() {
        for err in [
            StoreError::Corrupt("bad status 'lost'".into()),
            StoreError::Migration("v002 failed".into()),
            sqlite(rusqlite::ffi::SQLITE_CONSTRAINT),
        ] {
            assert!(!err.is_transient());
            let err: SafelinkError = err.into();
            assert!(matches!(err, SafelinkError::StoreFailure(_)));
        }
    }
}
