//! 统一的 API 错误类型与 HTTP 响应映射。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
    PayloadTooLarge(String),
    TooManyRequests,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg).into_response(),
            ApiError::TooManyRequests => {
                (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response()
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Validation(msg) => ApiError::BadRequest(msg),
            StoreError::Read(msg) => ApiError::Internal(msg),
            StoreError::TooLarge(msg) => ApiError::PayloadTooLarge(msg),
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Io(err) => ApiError::Internal(err.to_string()),
        }
    }
}
