use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use convert_dispatch::Unsupported;

/// Everything that can go wrong while serving `POST /convert`.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Missing or unusable form fields.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unsupported(#[from] Unsupported),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    MultipartRejected(#[from] MultipartRejection),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("{0:#}")]
    Conversion(anyhow::Error),
}

pub const MSG_MISSING_INPUT: &str = "No file or action selected";
pub const MSG_INVALID_NAME: &str = "Invalid file name";
pub const MSG_UNSUPPORTED: &str = "Conversion type not supported";
pub const MSG_CONVERSION_FAILED: &str = "Conversion failed";
pub const MSG_STORAGE: &str = "Storage error";

impl ConvertError {
    pub fn status(&self) -> StatusCode {
        match self {
            ConvertError::Validation(_) | ConvertError::Unsupported(_) => StatusCode::BAD_REQUEST,
            ConvertError::Multipart(e) => e.status(),
            ConvertError::MultipartRejected(e) => e.status(),
            ConvertError::Storage(_) | ConvertError::Conversion(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Plain-text body sent to the client.  Converter errors carry their
    /// full context chain unless `expose_details` is off.
    pub fn client_message(&self, expose_details: bool) -> String {
        match self {
            ConvertError::Validation(msg) => msg.clone(),
            ConvertError::Unsupported(_) => MSG_UNSUPPORTED.to_string(),
            ConvertError::Multipart(e) => e.body_text(),
            ConvertError::MultipartRejected(e) => e.body_text(),
            ConvertError::Storage(_) => MSG_STORAGE.to_string(),
            ConvertError::Conversion(e) if expose_details => format!("{e:#}"),
            ConvertError::Conversion(_) => MSG_CONVERSION_FAILED.to_string(),
        }
    }

    pub fn into_response_with(self, expose_details: bool) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("convert: {self}");
        } else {
            tracing::info!("convert rejected ({status}): {self}");
        }
        (status, self.client_message(expose_details)).into_response()
    }
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        self.into_response_with(true)
    }
}
