//! # V1 API Response Envelope & Error Contract
//!
//! Every v1 endpoint returns an [`ApiResponse<T>`] envelope:
//!
//! ```json
//! {
//!   "data": { ... },                       // present on success, absent on error
//!   "meta": { "requestId": "..." },        // optional
//!   "error": { "code": "service_busy", "message": "...", "stage": "received" }
//! }
//! ```
//!
//! `error.stage` names the pipeline stage that was active when a request
//! failed. It is absent for errors raised outside the pipeline (e.g. a
//! malformed multipart form).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TesseraError;
use crate::models::RequestStage;
use crate::processing::StageFailure;

/// Machine-readable error code included in every error response.
///
/// Serialized as a snake_case string on the wire (e.g. `"invalid_request"`).
/// Each variant maps to a fixed HTTP status code via [`ErrorCode::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The upload exceeds the configured size limit. HTTP 413.
    PayloadTooLarge,
    /// The upload is not an image in a supported format. HTTP 415.
    UnsupportedFormat,
    /// The image could not be decoded. HTTP 422.
    DecodeError,
    /// The requested language is not installed. HTTP 400.
    UnsupportedLanguage,
    /// The requested page segmentation mode is not supported. HTTP 400.
    InvalidSegmentationMode,
    /// The OCR engine failed. HTTP 502.
    RecognitionFailure,
    /// The OCR engine did not finish within its timeout. HTTP 504.
    RecognitionTimeout,
    /// The request deadline passed. HTTP 504.
    DeadlineExceeded,
    /// Too many requests in flight; retry later. HTTP 503.
    ServiceBusy,
    /// The caller went away. HTTP 408.
    Cancelled,
    /// The request was malformed or had invalid parameters. HTTP 400.
    InvalidRequest,
    /// An unexpected server-side error occurred. Internal details are never
    /// leaked to the client. HTTP 500.
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code corresponding to this error code.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::DecodeError => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UnsupportedLanguage | Self::InvalidSegmentationMode | Self::InvalidRequest => {
                StatusCode::BAD_REQUEST
            }
            Self::RecognitionFailure => StatusCode::BAD_GATEWAY,
            Self::RecognitionTimeout | Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::ServiceBusy => StatusCode::SERVICE_UNAVAILABLE,
            Self::Cancelled => StatusCode::REQUEST_TIMEOUT,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&TesseraError> for ErrorCode {
    fn from(err: &TesseraError) -> Self {
        match err {
            TesseraError::PayloadTooLarge { .. } => Self::PayloadTooLarge,
            TesseraError::UnsupportedFormat(_) => Self::UnsupportedFormat,
            TesseraError::Decode(_) => Self::DecodeError,
            TesseraError::UnsupportedLanguage(_) => Self::UnsupportedLanguage,
            TesseraError::InvalidSegmentationMode(_) => Self::InvalidSegmentationMode,
            TesseraError::Recognition(_) => Self::RecognitionFailure,
            TesseraError::RecognitionTimeout(_) => Self::RecognitionTimeout,
            TesseraError::DeadlineExceeded(_) => Self::DeadlineExceeded,
            TesseraError::ServiceBusy => Self::ServiceBusy,
            TesseraError::Cancelled => Self::Cancelled,
            TesseraError::Validation(_) => Self::InvalidRequest,
            TesseraError::Internal(_) => Self::InternalError,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(s)) => f.write_str(&s),
            _ => write!(f, "{self:?}"),
        }
    }
}

/// Structured error payload within the API envelope.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiError {
    /// Machine-readable error classification.
    pub code: ErrorCode,
    /// Human-readable description safe to display to end users.
    pub message: String,
    /// Pipeline stage that was active when the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<RequestStage>,
}

/// Request correlation data.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub request_id: Uuid,
}

/// Canonical v1 API response envelope.
///
/// On success, `data` is present and `error` is absent. On error, `error` is
/// present and `data` is absent.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,

    /// HTTP status to use in the response. Not serialized on the wire.
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    /// Success response with data (HTTP 200).
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            meta: None,
            error: None,
            status: StatusCode::OK,
        }
    }

    /// Success response tagged with the request id (HTTP 200).
    pub fn success_with_meta(data: T, meta: ResponseMeta) -> Self {
        Self {
            data: Some(data),
            meta: Some(meta),
            error: None,
            status: StatusCode::OK,
        }
    }

    /// Error response. HTTP status is derived from the [`ErrorCode`].
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let status = code.status();
        Self {
            data: None,
            meta: None,
            error: Some(ApiError {
                code,
                message: message.into(),
                stage: None,
            }),
            status,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        match serde_json::to_value(&self) {
            Ok(body) => (status, Json(body)).into_response(),
            Err(_) => {
                let body = serde_json::json!({
                    "error": {
                        "code": "internal_error",
                        "message": "An internal error occurred"
                    }
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stage: None,
        }
    }
}

impl<T: Serialize> From<ApiError> for ApiResponse<T> {
    fn from(error: ApiError) -> Self {
        Self {
            data: None,
            meta: None,
            status: error.code.status(),
            error: Some(error),
        }
    }
}

impl<T: Serialize> From<TesseraError> for ApiResponse<T> {
    /// Convert a [`TesseraError`] into a v1 [`ApiResponse`].
    ///
    /// Internal error details are **never** leaked to the client. For
    /// `internal_error` responses, a generic message is returned and the
    /// real error is logged via `tracing::error!`.
    fn from(err: TesseraError) -> Self {
        let code = ErrorCode::from(&err);
        if code == ErrorCode::InternalError {
            tracing::error!(error = %err, "Internal error mapped to v1 response");
            return ApiResponse::error(code, "An internal error occurred");
        }
        ApiResponse::error(code, err.to_string())
    }
}

impl<T: Serialize> From<StageFailure> for ApiResponse<T> {
    fn from(failure: StageFailure) -> Self {
        let mut resp = ApiResponse::from(failure.error);
        if let Some(error) = resp.error.as_mut() {
            error.stage = Some(failure.stage);
        }
        resp.meta = Some(ResponseMeta {
            request_id: failure.request_id,
        });
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StageTimings;

    #[test]
    fn success_response_serializes_without_error() {
        let resp = ApiResponse::success("hello");
        let json = serde_json::to_value(&resp).expect("serialize");
        assert_eq!(json["data"], "hello");
        assert!(json.get("error").is_none());
        assert!(json.get("meta").is_none());
    }

    #[test]
    fn error_response_serializes_without_data() {
        let resp = ApiResponse::<()>::error(ErrorCode::ServiceBusy, "busy");
        let json = serde_json::to_value(&resp).expect("serialize");
        assert!(json.get("data").is_none());
        assert_eq!(json["error"]["code"], "service_busy");
        assert_eq!(json["error"]["message"], "busy");
        assert!(json["error"].get("stage").is_none());
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn error_codes_match_error_kinds() {
        let errors = [
            TesseraError::PayloadTooLarge { size: 2, limit: 1 },
            TesseraError::UnsupportedFormat("x".into()),
            TesseraError::Decode("x".into()),
            TesseraError::UnsupportedLanguage("x".into()),
            TesseraError::InvalidSegmentationMode("x".into()),
            TesseraError::Recognition("x".into()),
            TesseraError::RecognitionTimeout(5),
            TesseraError::DeadlineExceeded("recognizing".into()),
            TesseraError::ServiceBusy,
            TesseraError::Cancelled,
            TesseraError::Validation("x".into()),
            TesseraError::Internal("x".into()),
        ];
        for err in errors {
            let code = ErrorCode::from(&err);
            assert_eq!(code.to_string(), err.kind());
            assert_eq!(code.status(), err.status());
        }
    }

    #[test]
    fn internal_error_does_not_leak() {
        let resp: ApiResponse<()> = TesseraError::Internal("secret debug info".into()).into();
        let err = resp.error.as_ref().expect("error");
        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(err.message, "An internal error occurred");
    }

    #[test]
    fn stage_failure_carries_stage_and_request_id() {
        let id = Uuid::new_v4();
        let resp: ApiResponse<()> = StageFailure {
            request_id: id,
            stage: RequestStage::Recognizing,
            error: TesseraError::RecognitionTimeout(30_000),
            timings: StageTimings::default(),
        }
        .into();

        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        let json = serde_json::to_value(&resp).expect("serialize");
        assert_eq!(json["error"]["code"], "recognition_timeout");
        assert_eq!(json["error"]["stage"], "recognizing");
        assert_eq!(json["meta"]["requestId"], id.to_string());
    }

    #[test]
    fn error_code_serializes_snake_case() {
        let json = serde_json::to_value(ErrorCode::InvalidSegmentationMode).expect("serialize");
        assert_eq!(json, "invalid_segmentation_mode");
        let code: ErrorCode = serde_json::from_str("\"decode_error\"").expect("deserialize");
        assert_eq!(code, ErrorCode::DecodeError);
    }
}
