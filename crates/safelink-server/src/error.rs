use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use safelink_shared::session::TokenError;
use safelink_shared::{SafelinkError, ValidationErrors};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Domain(#[from] SafelinkError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The request could not be decoded at all (bad JSON, bad path segment).
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationErrors> for ServerError {
    fn from(errors: ValidationErrors) -> Self {
        ServerError::Domain(errors.into())
    }
}

impl From<TokenError> for ServerError {
    fn from(err: TokenError) -> Self {
        ServerError::Unauthorized(err.to_string())
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ServerError {
    fn from(rejection: PathRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl ServerError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::Domain(err) => match err {
                SafelinkError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                SafelinkError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                SafelinkError::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE"),
                SafelinkError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                SafelinkError::TransientStore(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
                }
                SafelinkError::StoreFailure(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            ServerError::Domain(SafelinkError::TransientStore(_)) => {
                "Store temporarily unavailable, retry the request".to_string()
            }
            ServerError::Domain(SafelinkError::StoreFailure(_)) => {
                "Internal server error".to_string()
            }
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut error = serde_json::json!({
            "code": code,
            "message": message,
        });
        if let ServerError::Domain(SafelinkError::Validation(violations)) = &self {
            error["details"] = serde_json::json!(violations);
        }

        (status, axum::Json(serde_json::json!({ "error": error }))).into_response()
    }
}
