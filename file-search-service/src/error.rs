use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Document not found: {display_name}")]
    DocumentNotFound { display_name: String },

    #[error(transparent)]
    Gemini(#[from] GeminiError),

    /// The API accepted a call but returned a resource without its name
    #[error("{message}")]
    MalformedOperation { message: String },

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Remote File Search API errors
#[derive(Error, Debug)]
pub enum GeminiError {
    /// The API answered with a non-success status.
    ///
    /// This is the classified fault: direct store uploads that the API rejects
    /// are retried through the Files API staging path.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid response from {url}")]
    InvalidResponse {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl GeminiError {
    /// Whether this fault means "the API rejected the call" rather than "the call never
    /// completed". Only the former triggers the staging fallback.
    pub fn is_classified(&self) -> bool {
        matches!(self, GeminiError::Api { .. })
    }
}

/// Render an error and all of its sources as one line
pub fn format_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::DocumentNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Gemini(GeminiError::Api { status, .. }) if *status == 404 => {
                StatusCode::NOT_FOUND
            }
            ServiceError::Gemini(_) | ServiceError::MalformedOperation { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::Gemini(GeminiError::Api { .. }) => "gemini_api",
            ServiceError::Gemini(GeminiError::Request { .. }) => "gemini_request",
            ServiceError::Gemini(GeminiError::InvalidResponse { .. }) => "gemini_invalid_response",
            ServiceError::MalformedOperation { .. } => "malformed_operation",
            ServiceError::Io(_) => "io_error",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
