//! Gemini streaming client.
//!
//! Each call to [`GenerationBackend::start_stream`] issues a fresh
//! `streamGenerateContent?alt=sse` request against the shared
//! [`ClientConfiguration`] and returns a lazy, pull-based [`ChunkStream`].
//! No per-request state is kept on the client.

use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfiguration;
use crate::upstream::types::{
    ApiErrorEnvelope, GenerateContentRequest, GenerateContentResponse, BLOCKED_FINISH_REASONS,
};

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("failed to reach upstream: {0}")]
    Connection(#[source] reqwest::Error),

    #[error("upstream returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("upstream stream interrupted: {0}")]
    Stream(String),

    #[error("malformed upstream chunk: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("upstream error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("generation blocked: {0}")]
    Blocked(String),

    #[error("generation cancelled")]
    Cancelled,
}

/// One unit of streamed output: the text parts of the first candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationChunk {
    pub parts: Vec<String>,
}

impl GenerationChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![text.into()],
        }
    }
}

/// Lazy sequence of chunks. Ends cleanly on upstream completion; an `Err`
/// item is terminal.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerationChunk, UpstreamError>> + Send>>;

/// Source of streamed generations.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Start a streaming generation for `prompt`.
    ///
    /// Fails if the upstream cannot be reached or rejects the request. The
    /// handshake returns [`UpstreamError::Cancelled`] if `cancel` fires first.
    async fn start_stream(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
    ) -> Result<ChunkStream, UpstreamError>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// Gemini REST client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: ClientConfiguration,
}

impl GeminiClient {
    pub fn new(config: ClientConfiguration) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    pub fn with_http_client(config: ClientConfiguration, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, self.config.model
        )
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn start_stream(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
    ) -> Result<ChunkStream, UpstreamError> {
        let body = GenerateContentRequest::from_prompt(prompt, self.config.max_output_tokens);

        debug!(
            model = %self.config.model,
            max_output_tokens = self.config.max_output_tokens,
            "Opening upstream stream"
        );

        let send = self
            .http
            .post(self.stream_url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
            res = send => res.map_err(UpstreamError::Connection)?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                text = response.text() => text.unwrap_or_default(),
            };
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) if event.data.trim().is_empty() => None,
                    Ok(event) => Some(decode_chunk(&event.data)),
                    Err(e) => Some(Err(UpstreamError::Stream(e.to_string()))),
                }
            });

        Ok(Box::pin(stream))
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Decode one SSE `data:` payload into a chunk.
pub fn decode_chunk(data: &str) -> Result<GenerationChunk, UpstreamError> {
    let response: GenerateContentResponse = serde_json::from_str(data)?;

    if let Some(error) = response.error {
        return Err(UpstreamError::Api {
            code: error.code,
            message: error.message,
        });
    }

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(UpstreamError::Blocked(format!("prompt blocked ({reason})")));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(GenerationChunk::default());
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKED_FINISH_REASONS.contains(&reason) {
            return Err(UpstreamError::Blocked(format!("candidate blocked ({reason})")));
        }
    }

    let parts = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok(GenerationChunk { parts })
}

/// Pull the human-readable message out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ if body.trim().is_empty() => "empty response body".to_string(),
        _ => body.trim().to_string(),
    }
}
