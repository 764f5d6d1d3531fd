use thiserror::Error;

use crate::validation::ValidationErrors;

/// Failures of the alert core, shared by every store implementation and the
/// service layer above them.
#[derive(Error, Debug)]
pub enum SafelinkError {
    /// Malformed or out-of-range input. Nothing was persisted.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation is not legal in the entity's current state.
    #[error("{entity} {id} is {status}")]
    InvalidState {
        entity: &'static str,
        id: String,
        status: String,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The backing store is temporarily unavailable. No partial state was
    /// exposed, so the whole operation is safe to retry.
    #[error("Store unavailable: {0}")]
    TransientStore(String),

    /// The store failed in a way retrying will not fix, such as a corrupt
    /// row or a failed migration.
    #[error("Store failure: {0}")]
    StoreFailure(String),
}

impl SafelinkError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(entity: &'static str, id: impl ToString, status: impl ToString) -> Self {
        Self::InvalidState {
            entity,
            id: id.to_string(),
            status: status.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::TransientStore(_) | Self::StoreFailure(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SafelinkError>;
