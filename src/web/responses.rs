use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Canonical JSON payload for error responses.
#[derive(Debug, Serialize, Clone)]
pub struct ApiError {
    pub error: String,
}

/// Canonical JSON payload for plain success messages.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Helper for controllers that need to return `(StatusCode, Json<ApiError>)`.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

pub fn internal_error() -> (StatusCode, Json<ApiError>) {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Внутренняя ошибка сервера")
}

/// `302 Found` redirect. `axum::response::Redirect` only offers 303/307/308.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Parses a numeric path id, answering `400` for anything else.
pub fn parse_id(raw: &str) -> Result<i32, (StatusCode, Json<ApiError>)> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "Некорректный ID"))
}
