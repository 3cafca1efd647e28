use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("Payload too large: {size} bytes (max {limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid segmentation mode: {0}")]
    InvalidSegmentationMode(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Recognition timed out after {0} ms")]
    RecognitionTimeout(u64),

    #[error("Deadline exceeded before {0}")]
    DeadlineExceeded(String),

    #[error("Service busy, retry later")]
    ServiceBusy,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl TesseraError {
    /// Stable machine-readable kind, used on the wire and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TesseraError::PayloadTooLarge { .. } => "payload_too_large",
            TesseraError::UnsupportedFormat(_) => "unsupported_format",
            TesseraError::Decode(_) => "decode_error",
            TesseraError::UnsupportedLanguage(_) => "unsupported_language",
            TesseraError::InvalidSegmentationMode(_) => "invalid_segmentation_mode",
            TesseraError::Recognition(_) => "recognition_failure",
            TesseraError::RecognitionTimeout(_) => "recognition_timeout",
            TesseraError::DeadlineExceeded(_) => "deadline_exceeded",
            TesseraError::ServiceBusy => "service_busy",
            TesseraError::Cancelled => "cancelled",
            TesseraError::Validation(_) => "invalid_request",
            TesseraError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            TesseraError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            TesseraError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            TesseraError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TesseraError::UnsupportedLanguage(_)
            | TesseraError::InvalidSegmentationMode(_)
            | TesseraError::Validation(_) => StatusCode::BAD_REQUEST,
            TesseraError::Recognition(_) => StatusCode::BAD_GATEWAY,
            TesseraError::RecognitionTimeout(_) | TesseraError::DeadlineExceeded(_) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            TesseraError::ServiceBusy => StatusCode::SERVICE_UNAVAILABLE,
            TesseraError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            TesseraError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TesseraError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            TesseraError::Internal(_) => {
                tracing::error!(error = %self, "Internal error");
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.kind(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, TesseraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_snake_case() {
        assert_eq!(
            TesseraError::PayloadTooLarge { size: 2, limit: 1 }.kind(),
            "payload_too_large"
        );
        assert_eq!(
            TesseraError::UnsupportedFormat("x".into()).kind(),
            "unsupported_format"
        );
        assert_eq!(TesseraError::Decode("x".into()).kind(), "decode_error");
        assert_eq!(
            TesseraError::UnsupportedLanguage("klingon".into()).kind(),
            "unsupported_language"
        );
        assert_eq!(
            TesseraError::InvalidSegmentationMode("0".into()).kind(),
            "invalid_segmentation_mode"
        );
        assert_eq!(
            TesseraError::Recognition("boom".into()).kind(),
            "recognition_failure"
        );
        assert_eq!(
            TesseraError::RecognitionTimeout(10).kind(),
            "recognition_timeout"
        );
        assert_eq!(
            TesseraError::DeadlineExceeded("decoding".into()).kind(),
            "deadline_exceeded"
        );
        assert_eq!(TesseraError::ServiceBusy.kind(), "service_busy");
    }

    #[test]
    fn service_busy_is_backpressure_not_server_error() {
        assert_eq!(
            TesseraError::ServiceBusy.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn internal_errors_map_to_500() {
        assert_eq!(TesseraError::Internal("x".into()).kind(), "internal_error");
        assert_eq!(
            TesseraError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            TesseraError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn payload_too_large_message_mentions_sizes() {
        let msg = TesseraError::PayloadTooLarge {
            size: 2048,
            limit: 1024,
        }
        .to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));
    }
}
