//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use futures::stream;
use tokio_util::sync::CancellationToken;

use gemini_sse_relay::config::RelayOptions;
use gemini_sse_relay::relay::Relay;
use gemini_sse_relay::server::api::{build_router, AppState};
use gemini_sse_relay::upstream::{ChunkStream, GenerationBackend, GenerationChunk, UpstreamError};

/// One scripted upstream step.
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(&'static str),
    Fail(&'static str),
    /// Never yields again.
    Hang,
}

/// Backend replaying a fixed script. Records the prompt it was called with
/// and whether the chunk stream has been dropped.
pub struct ScriptedBackend {
    steps: Vec<Step>,
    pub released: Arc<AtomicBool>,
    pub last_prompt: std::sync::Mutex<Option<String>>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            released: Arc::new(AtomicBool::new(false)),
            last_prompt: std::sync::Mutex::new(None),
        })
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn start_stream(
        &self,
        _cancel: &CancellationToken,
        prompt: &str,
    ) -> Result<ChunkStream, UpstreamError> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());

        let flag = ReleaseFlag(self.released.clone());
        let steps = self.steps.clone();
        let s = stream::unfold((flag, steps.into_iter()), |(flag, mut steps)| async move {
            match steps.next()? {
                Step::Chunk(text) => Some((Ok(GenerationChunk::text(text)), (flag, steps))),
                Step::Fail(msg) => Some((
                    Err(UpstreamError::Stream(msg.to_string())),
                    (flag, steps),
                )),
                Step::Hang => {
                    futures::future::pending::<()>().await;
                    None
                }
            }
        });
        Ok(Box::pin(s))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

pub fn router_with(backend: Arc<dyn GenerationBackend>, static_dir: PathBuf) -> Router {
    let state = Arc::new(AppState {
        relay: Relay::new(backend, RelayOptions::default()),
        static_dir,
    });
    build_router(state)
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A parsed SSE event: name and `data:` lines joined with `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub event: String,
    pub data: String,
}

/// Parse an SSE body the way an EventSource client does.
pub fn parse_sse(body: &str) -> Vec<ParsedEvent> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| {
            let mut event = String::new();
            let mut data = Vec::new();
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = name.to_string();
                } else if let Some(value) = line.strip_prefix("data: ") {
                    data.push(value);
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value);
                }
            }
            ParsedEvent {
                event,
                data: data.join("\n"),
            }
        })
        .collect()
}
