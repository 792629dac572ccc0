//! Response envelope shared by every control endpoint.
//!
//! Successes and failures use the same shape: `{ "msg", "error", "data" }`.
//! Failures are produced by [`RadioError`](crate::error::RadioError)'s
//! `IntoResponse` implementation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub msg: String,
    pub error: bool,
    pub data: Option<T>,
}

/// Success envelope carrying `data` and an empty message.
pub fn api_success<T: Serialize>(data: T) -> Response {
    api_message(String::new(), Some(data))
}

/// Success envelope with a human-readable message.
pub fn api_message<T: Serialize>(msg: impl Into<String>, data: Option<T>) -> Response {
    let body = Envelope {
        msg: msg.into(),
        error: false,
        data,
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Success envelope without data.
pub fn api_ok() -> Response {
    api_message::<()>(String::new(), None)
}
