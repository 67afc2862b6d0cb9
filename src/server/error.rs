use crate::error::FanoutError;
use crate::error::ProcessError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use tracing::error;
use tracing::warn;

/// Body of every failed response
#[derive(Serialize, Debug)]
pub(crate) struct ErrorBody {
    pub(crate) kind: &'static str,
    pub(crate) message: String,
}

/// Failure of a request handler.
///
/// Request-level failures are answered with 400 and their kind; everything else
/// is logged and answered with a generic 500.
#[derive(Debug)]
pub(crate) enum ApiError {
    Fanout(FanoutError),
    Multipart(MultipartError),
}

impl From<FanoutError> for ApiError {
    fn from(error: FanoutError) -> Self {
        ApiError::Fanout(error)
    }
}

impl From<ProcessError> for ApiError {
    fn from(error: ProcessError) -> Self {
        ApiError::Fanout(error.into())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        ApiError::Multipart(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Fanout(error) => match error.as_process_error() {
                Some(process_error) => {
                    warn!(kind = process_error.kind(), %process_error, "request rejected");
                    let body = ErrorBody { kind: process_error.kind(), message: process_error.to_string() };
                    (StatusCode::BAD_REQUEST, body)
                }
                None => {
                    error!(%error, "request failed");
                    let body = ErrorBody { kind: "Internal", message: "Internal server error".to_owned() };
                    (StatusCode::INTERNAL_SERVER_ERROR, body)
                }
            },
            ApiError::Multipart(error) => {
                let body = ErrorBody { kind: "InvalidMultipart", message: error.body_text() };
                (error.status(), body)
            }
        };
        (status, Json(body)).into_response()
    }
}
