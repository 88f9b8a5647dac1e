use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured error body returned for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional detail (field-level validation errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Error taxonomy of the warehouse execution core.
///
/// Every variant is a per-request failure: caught at the handler boundary,
/// turned into a structured response, never fatal to the process. Any error
/// raised inside a transaction rolls the whole transaction back.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Task type not found: {0}")]
    TaskTypeNotFound(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Task {0} is already in progress")]
    AlreadyInProgress(Uuid),

    #[error("Validation failed: {message}")]
    ValidationFailed {
        message: String,
        details: Option<String>,
    },

    #[error("Insufficient quantity on pallet {pallet}: requested {requested}, available {available}")]
    InsufficientQuantity {
        pallet: String,
        requested: i32,
        available: i32,
    },

    #[error("Malformed content payload: {0}")]
    MalformedContent(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Event error: {0}")]
    EventError(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::ValidationFailed {
            message: message.into(),
            details: None,
        }
    }

    /// Maps each variant to its HTTP status.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::TaskTypeNotFound(_)
            | ServiceError::TaskNotFound(_)
            | ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::AlreadyInProgress(_) => StatusCode::CONFLICT,
            ServiceError::InvalidFilter(_)
            | ServiceError::ValidationFailed { .. }
            | ServiceError::InsufficientQuantity { .. }
            | ServiceError::MalformedContent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::DatabaseError(_) | ServiceError::EventError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ServiceError::ValidationFailed { details, .. } => details.clone(),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationFailed {
            message: "request validation failed".to_string(),
            details: Some(errors.to_string()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error while handling request");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.to_string(),
            details: self.details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            ServiceError::TaskTypeNotFound("bogus".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::AlreadyInProgress(Uuid::new_v4()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InsufficientQuantity {
                pallet: "PL-1".into(),
                requested: 10,
                available: 4,
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::MalformedContent("bad shape".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
