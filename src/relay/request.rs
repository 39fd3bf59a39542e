//! Inbound request decoding and validation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;

/// Client-input rejections, returned before any SSE headers are written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Invalid request format")]
    InvalidRequest,

    #[error("Prompt cannot be empty")]
    EmptyPrompt,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::InvalidRequest | RelayError::EmptyPrompt => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// `POST /api/generate` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    pub prompt: String,
}

impl PromptRequest {
    /// Decode a JSON body. A missing `prompt` field is treated as empty.
    pub fn from_json(body: &[u8]) -> Result<Self, RelayError> {
        let request: PromptRequest =
            serde_json::from_slice(body).map_err(|_| RelayError::InvalidRequest)?;
        if request.prompt.is_empty() {
            return Err(RelayError::EmptyPrompt);
        }
        Ok(request)
    }
}
