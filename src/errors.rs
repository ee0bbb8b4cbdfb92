use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

/// Field name to the list of messages reported for it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Validation failed",
    "fields": { "name": ["Name is required"] },
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Not Found")]
    pub error: String,
    /// Human-readable error description
    #[schema(example = "Bill not found")]
    pub message: String,
    /// Per-field validation messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when error occurred
    #[schema(example = "2024-12-09T10:30:00.000Z")]
    pub timestamp: String,
}

impl ErrorResponse {
    fn build(status: StatusCode, message: String, fields: Option<FieldErrors>) -> Self {
        Self {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            fields,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("{0}")]
    NotFound(String),

    #[error("Validation failed")]
    FieldValidation(FieldErrors),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InsufficientStock(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::FieldValidation(field_errors_from(&err))
    }
}

/// Flattens validator output into `field -> [messages]`, falling back to the
/// rule code when a rule carries no message.
pub fn field_errors_from(err: &validator::ValidationErrors) -> FieldErrors {
    err.field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let messages = errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

impl ServiceError {
    /// Wraps a database error, promoting unique-key violations to `Conflict`.
    pub fn db_error(error: DbErr, conflict_message: impl Into<String>) -> Self {
        match error.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Self::Conflict(conflict_message.into()),
            _ => Self::DatabaseError(error),
        }
    }

    /// Single field validation failure.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.into(), vec![message.into()]);
        Self::FieldValidation(fields)
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::FieldValidation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Database errors are reported generically.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            _ => self.to_string(),
        }
    }

    pub fn fields(&self) -> Option<&FieldErrors> {
        match self {
            Self::FieldValidation(fields) => Some(fields),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::build(status, self.response_message(), self.fields().cloned());
        (status, Json(body)).into_response()
    }
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::ServiceError(service_error) => service_error.into_response(),
            ApiError::BadRequest(msg) => {
                let body = ErrorResponse::build(StatusCode::BAD_REQUEST, msg, None);
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use validator::Validate;

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("Bill not found".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.message, "Bill not found");
        assert_eq!(payload.error, "Not Found");
    }

    #[tokio::test]
    async fn field_validation_response_lists_fields() {
        let response = ServiceError::field("name", "Name is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        let fields = payload.fields.expect("fields present");
        assert_eq!(fields["name"], vec!["Name is required".to_string()]);
    }

    #[tokio::test]
    async fn database_error_is_reported_generically() {
        let response =
            ServiceError::DatabaseError(DbErr::Custom("disk on fire".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.message, "Database error");
        assert!(payload.fields.is_none());
    }

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::field("items", "x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn insufficient_stock_message_is_passed_through() {
        let err = ServiceError::InsufficientStock("Insufficient stock for Pen. Available: 2".into());
        assert_eq!(
            err.response_message(),
            "Insufficient stock for Pen. Available: 2"
        );
    }

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "Name is required"))]
        name: String,
        #[validate(range(min = 0))]
        quantity: i32,
    }

    #[test]
    fn validator_errors_flatten_to_field_map() {
        let sample = Sample {
            name: String::new(),
            quantity: -1,
        };
        let err: ServiceError = sample.validate().unwrap_err().into();
        let fields = err.fields().expect("field errors");
        assert_eq!(fields["name"], vec!["Name is required".to_string()]);
        assert_eq!(fields["quantity"], vec!["range".to_string()]);
    }
}
