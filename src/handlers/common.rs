use crate::errors::{ApiError, ServiceError};
use crate::ApiResponse;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Map service errors to API errors
pub fn map_service_error(err: ServiceError) -> ApiError {
    ApiError::ServiceError(err)
}

/// Unwraps a JSON body. Every rejection (syntax, shape, missing content
/// type) is a 400; 422 stays reserved for stock shortfalls.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    })
}

/// Unwraps path parameters, reporting a malformed id in the error body.
pub fn path_param<T>(param: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    param.map(|Path(value)| value).map_err(|rejection| {
        ApiError::BadRequest(format!("Invalid path parameter: {}", rejection.body_text()))
    })
}

/// Unwraps a query string, reporting unparsable values in the error body.
pub fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query.map(|Query(value)| value).map_err(|rejection| {
        ApiError::BadRequest(format!("Invalid query string: {}", rejection.body_text()))
    })
}

fn normalize_string(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Trims an optional query string, treating blank as absent
pub fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value.as_deref().and_then(normalize_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn created_response_wraps_payload_in_envelope() {
        let response = created_response(serde_json::json!({ "id": 7 }));
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["id"], 7);
        assert!(value["meta"]["timestamp"].is_string());
    }

    #[derive(Debug, serde::Deserialize)]
    struct Line {
        #[allow(dead_code)]
        quantity: i32,
    }

    #[tokio::test]
    async fn mistyped_json_body_is_a_bad_request() {
        use axum::extract::FromRequest;

        let request = axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(r#"{"quantity":"many"}"#))
            .unwrap();
        let payload = Json::<Line>::from_request(request, &()).await;
        assert!(matches!(payload, Err(JsonRejection::JsonDataError(_))));

        let response = json_body(payload).unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(value["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request body"));
    }

    #[test]
    fn blank_query_strings_are_dropped() {
        assert_eq!(normalize_optional_string(Some("  ".into())), None);
        assert_eq!(
            normalize_optional_string(Some(" pen ".into())),
            Some("pen".to_string())
        );
        assert_eq!(normalize_optional_string(None), None);
    }
}
