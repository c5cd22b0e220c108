use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docrag::RagError;
use serde_json::json;
use tracing::{error, warn};

/// The message returned for every failure that is not the caller's fault.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred.";

/// A custom error type for the server application.
///
/// Client mistakes become 400 responses carrying their message. Everything else
/// is logged and answered with a generic 500, so provider and storage details
/// never reach the client.
#[derive(Debug)]
pub enum AppError {
    /// Errors originating from `docrag`.
    Rag(RagError),
    /// A request body that could not be read.
    BadRequest(String),
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        AppError::Rag(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, error_message) = match self {
            AppError::Rag(RagError::Validation(message)) => {
                warn!("Rejected request: {message}");
                (StatusCode::BAD_REQUEST, message)
            }
            AppError::BadRequest(message) => {
                warn!("Rejected request body: {message}");
                (StatusCode::BAD_REQUEST, message)
            }
            AppError::Rag(err) => {
                error!("RagError: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR_MESSAGE.to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status_code, body).into_response()
    }
}
