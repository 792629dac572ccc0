//! Centralized error types for the radiocast core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` so control operations report failures as a
//!   structured negative result in the same envelope as successes

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::ogg::DemuxError;
use crate::resolver::ResolveError;
use crate::transcode::TranscodeError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for DemuxError {
    fn code(&self) -> &'static str {
        match self {
            Self::Desync { .. } => "container_desync",
            Self::UnsupportedVersion(_) => "unsupported_container_version",
            Self::Io(_) => "container_io_error",
        }
    }
}

impl ErrorCode for TranscodeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "transcoder_spawn_failed",
            Self::MissingPipe(_) => "transcoder_pipe_missing",
            Self::MuxerUnavailable => "muxer_unavailable",
        }
    }
}

impl ErrorCode for ResolveError {
    fn code(&self) -> &'static str {
        match self {
            Self::Spawn(_) => "resolver_spawn_failed",
            Self::Extractor(_) => "resolver_extractor_failed",
            Self::Parse(_) => "resolver_parse_failed",
            Self::Http(_) => "resolver_http_failed",
            Self::TooLong { .. } => "track_too_long",
            Self::NotFound(_) => "track_not_found",
        }
    }
}

/// Application-wide error type for the radiocast server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum RadioError {
    /// Client sent an invalid or malformed request.
    #[error("{0}")]
    InvalidRequest(String),

    /// A reference could not be turned into playable metadata.
    #[error("Could not resolve track: {0}")]
    ResolveFailed(String),

    /// No stream epoch is currently live.
    #[error("No stream available.")]
    StreamUnavailable,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RadioError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::ResolveFailed(_) => "resolve_failed",
            Self::StreamUnavailable => "stream_unavailable",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ResolveFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::StreamUnavailable => StatusCode::NOT_FOUND,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type RadioResult<T> = Result<T, RadioError>;

/// JSON body for error responses, same envelope as successful responses.
#[derive(Serialize)]
struct ErrorResponse {
    msg: String,
    error: bool,
    data: Option<()>,
    code: &'static str,
}

impl IntoResponse for RadioError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            msg: self.to_string(),
            error: true,
            data: None,
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ResolveError> for RadioError {
    fn from(err: ResolveError) -> Self {
        Self::ResolveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_returns_bad_request() {
        let err = RadioError::InvalidRequest("missing `url` argument".into());
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "missing `url` argument");
    }

    #[test]
    fn stream_unavailable_returns_not_found() {
        let err = RadioError::StreamUnavailable;
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "No stream available.");
    }

    #[test]
    fn resolve_error_converts_to_resolve_failed() {
        let err: RadioError = ResolveError::TooLong {
            duration: 1000.0,
            max: 900.0,
        }
        .into();
        assert_eq!(err.code(), "resolve_failed");
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn internal_errors_are_server_errors() {
        let err = RadioError::Internal("client builder failed".into());
        assert_eq!(err.code(), "internal_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = RadioError::Configuration("feed_chunk_size must be > 0".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn subsystem_codes_are_distinct() {
        assert_eq!(
            DemuxError::Desync { found: *b"junk" }.code(),
            "container_desync"
        );
        assert_eq!(TranscodeError::MuxerUnavailable.code(), "muxer_unavailable");
    }
}
