//! SSE (Server-Sent Events) rendering of relay events.
//!
//! Converts a channel of [`RelayEvent`]s into SSE frames:
//!
//! ```text
//! event: connected        data: <RFC 3339 timestamp>
//! event: text             data: <chunk text, one data: line per text line>
//! event: done             data: (empty)
//! event: error            data: Error: <description>
//! ```
//!
//! Every frame is a separate body chunk, so hyper writes it to the socket as
//! soon as it is produced.

use std::convert::Infallible;

use axum::http::{header, HeaderValue};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use chrono::SecondsFormat;
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::relay::RelayEvent;

/// A single SSE frame: an event name and its data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: &'static str,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: &'static str, data: impl Into<String>) -> Self {
        Self {
            event,
            data: data.into(),
        }
    }

    /// Build the wire event. A multi-line payload is split over several
    /// `data:` fields; an empty one still carries a single empty `data:` so
    /// the client dispatches it.
    pub fn to_event(&self) -> Event {
        Event::default()
            .event(self.event)
            .data(normalize_line_breaks(&self.data))
    }
}

impl From<RelayEvent> for SseFrame {
    fn from(event: RelayEvent) -> Self {
        match event {
            RelayEvent::Connected(at) => {
                SseFrame::new("connected", at.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            RelayEvent::Text(text) => SseFrame::new("text", text),
            RelayEvent::Done => SseFrame::new("done", ""),
            RelayEvent::Error(message) => SseFrame::new("error", message),
        }
    }
}

/// Fold `\r\n` and lone `\r` into `\n`.
///
/// SSE treats all three as line ends. Once folded, every `\n` becomes a
/// `\ndata: ` continuation and the client joins the fields back together
/// with `\n`, recovering the text as one event.
pub fn normalize_line_breaks(text: &str) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text.to_string()
    }
}

/// Convert a relay event receiver into a stream of SSE events.
pub fn relay_to_sse_stream(
    rx: mpsc::Receiver<RelayEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    ReceiverStream::new(rx).map(|event| Ok(SseFrame::from(event).to_event()))
}

/// Wrap a relay event receiver in a `text/event-stream` response.
pub fn sse_response(rx: mpsc::Receiver<RelayEvent>) -> Response {
    let mut response = Sse::new(relay_to_sse_stream(rx)).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    async fn render(events: Vec<RelayEvent>) -> String {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);

        let response = sse_response(rx);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[test]
    fn test_normalize_line_breaks() {
        assert_eq!(normalize_line_breaks("plain"), "plain");
        assert_eq!(normalize_line_breaks("a\r\nb\rc"), "a\nb\nc");
    }

    #[tokio::test]
    async fn test_multiline_text_is_one_frame() {
        let body = render(vec![RelayEvent::Text("a\nb".into())]).await;
        assert_eq!(body, "event: text\ndata: a\ndata: b\n\n");
    }

    #[tokio::test]
    async fn test_carriage_returns_become_continuations() {
        let body = render(vec![RelayEvent::Text("a\r\nb\rc\n".into())]).await;
        assert_eq!(body, "event: text\ndata: a\ndata: b\ndata: c\ndata: \n\n");
    }

    #[tokio::test]
    async fn test_done_has_empty_data() {
        let body = render(vec![RelayEvent::Done]).await;
        assert_eq!(body, "event: done\ndata: \n\n");
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let body = render(vec![
            RelayEvent::Connected(at),
            RelayEvent::Text("The sky is ".into()),
            RelayEvent::Text("blue.".into()),
            RelayEvent::Done,
        ])
        .await;

        assert_eq!(
            body,
            "event: connected\ndata: 2024-05-01T12:30:00Z\n\n\
             event: text\ndata: The sky is \n\n\
             event: text\ndata: blue.\n\n\
             event: done\ndata: \n\n"
        );
    }

    #[tokio::test]
    async fn test_error_frame() {
        let body = render(vec![RelayEvent::Error("Error: upstream reset".into())]).await;
        assert_eq!(body, "event: error\ndata: Error: upstream reset\n\n");
    }
}
