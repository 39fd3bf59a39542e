//! Relay session: drives one upstream generation and turns it into a
//! sequence of [`RelayEvent`]s.
//!
//! Every session runs as two tasks:
//! 1. the pull loop, which sends `Connected`, opens the upstream stream and
//!    forwards chunks until completion or the first error;
//! 2. a disconnect watcher, which cancels the session's
//!    [`CancellationToken`] once the event receiver is dropped (the client
//!    went away).
//!
//! The pull loop checks the token between chunks, so a disconnect stops
//! upstream consumption within one pull. The watcher exits as soon as the
//! pull loop finishes, whichever way it finishes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::RelayOptions;
use crate::relay::request::PromptRequest;
use crate::upstream::{GenerationBackend, UpstreamError};

/// Bounded buffer between the pull loop and the HTTP body.
const EVENT_BUFFER: usize = 32;

/// An event destined for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Stream opened.
    Connected(DateTime<Utc>),
    /// One text part of an upstream chunk.
    Text(String),
    /// Upstream finished cleanly. Terminal.
    Done,
    /// Upstream failed. Terminal.
    Error(String),
}

impl RelayEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayEvent::Done | RelayEvent::Error(_))
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed { parts: usize },
    Failed { parts: usize },
    Disconnected { parts: usize },
}

/// Starts relay sessions against a shared backend.
#[derive(Clone)]
pub struct Relay {
    backend: Arc<dyn GenerationBackend>,
    options: RelayOptions,
}

impl Relay {
    pub fn new(backend: Arc<dyn GenerationBackend>, options: RelayOptions) -> Self {
        Self { backend, options }
    }

    /// Start a session for `request`, streaming events to the returned receiver.
    ///
    /// Dropping the receiver cancels the session.
    pub fn start(&self, request: PromptRequest) -> mpsc::Receiver<RelayEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let request_id = Uuid::new_v4().to_string();

        info!(
            %request_id,
            model = self.backend.model(),
            prompt_chars = request.prompt.chars().count(),
            "Starting relay"
        );

        tokio::spawn(watch_disconnect(tx.clone(), cancel.clone(), request_id.clone()));

        let backend = self.backend.clone();
        let options = self.options;
        tokio::spawn(async move {
            // Cancelling on exit releases the watcher.
            let _release = cancel.clone().drop_guard();

            let outcome = pull(
                backend.as_ref(),
                &request.prompt,
                &tx,
                &cancel,
                options,
                &request_id,
            )
            .await;

            match outcome {
                Outcome::Completed { parts } => {
                    info!(%request_id, parts, "Relay complete")
                }
                Outcome::Failed { parts } => {
                    info!(%request_id, parts, "Relay ended with upstream error")
                }
                Outcome::Disconnected { parts } => {
                    info!(%request_id, parts, "Relay aborted, client disconnected")
                }
            }
        });

        rx
    }
}

async fn watch_disconnect(
    tx: mpsc::Sender<RelayEvent>,
    cancel: CancellationToken,
    request_id: String,
) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        _ = tx.closed() => {
            debug!(%request_id, "Client disconnected, cancelling upstream pull");
            cancel.cancel();
        }
    }
}

async fn pull(
    backend: &dyn GenerationBackend,
    prompt: &str,
    tx: &mpsc::Sender<RelayEvent>,
    cancel: &CancellationToken,
    options: RelayOptions,
    request_id: &str,
) -> Outcome {
    let mut parts = 0;

    if tx.send(RelayEvent::Connected(Utc::now())).await.is_err() {
        return Outcome::Disconnected { parts };
    }

    let started = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Outcome::Disconnected { parts },
        res = backend.start_stream(cancel, prompt) => res,
    };

    let mut chunks = match started {
        Ok(chunks) => chunks,
        Err(UpstreamError::Cancelled) => return Outcome::Disconnected { parts },
        Err(e) => return fail(tx, e, parts, request_id).await,
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Outcome::Disconnected { parts },
            next = chunks.next() => next,
        };

        match next {
            None => {
                if tx.send(RelayEvent::Done).await.is_err() {
                    return Outcome::Disconnected { parts };
                }
                return Outcome::Completed { parts };
            }
            Some(Ok(chunk)) => {
                for text in chunk.parts {
                    if options.log_chunks {
                        debug!(%request_id, text = ?text, "Raw text chunk from upstream");
                    }
                    if tx.send(RelayEvent::Text(text)).await.is_err() {
                        return Outcome::Disconnected { parts };
                    }
                    parts += 1;
                }
            }
            Some(Err(UpstreamError::Cancelled)) => return Outcome::Disconnected { parts },
            Some(Err(e)) => return fail(tx, e, parts, request_id).await,
        }
    }
}

async fn fail(
    tx: &mpsc::Sender<RelayEvent>,
    err: UpstreamError,
    parts: usize,
    request_id: &str,
) -> Outcome {
    error!(%request_id, error = %err, "Generation error");
    if tx.send(RelayEvent::Error(format!("Error: {err}"))).await.is_err() {
        return Outcome::Disconnected { parts };
    }
    Outcome::Failed { parts }
}
