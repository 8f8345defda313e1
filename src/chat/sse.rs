//! SSE framing.
//!
//! Producers emit [`ChatStreamEvent`]s into a channel; the HTTP layer
//! drains the channel and writes `data: {"type": T, "data": D}\n\n` frames.
//! Producers never touch the transport, so cancellation and backpressure
//! stay local to the channel.

use std::convert::Infallible;

use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use tokio::sync::mpsc;

use crate::types::{ChatMessage, ChatStreamEvent};

/// Sending side of one SSE turn, scoped to a session.
#[derive(Clone)]
pub struct EventSender {
    session_id: String,
    tx: mpsc::UnboundedSender<ChatStreamEvent>,
}

impl EventSender {
    pub fn channel(session_id: &str) -> (Self, mpsc::UnboundedReceiver<ChatStreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                session_id: session_id.to_string(),
                tx,
            },
            rx,
        )
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn send(&self, event: ChatStreamEvent) {
        // A dropped receiver means the client went away; producers finish
        // best-effort.
        let _ = self.tx.send(event);
    }

    /// Emit a pre-built event (used by the simulate stream's stage blocks).
    pub fn send_raw(&self, event: ChatStreamEvent) {
        self.send(event);
    }

    pub fn token(&self, content: impl Into<String>) {
        self.send(ChatStreamEvent::token(&self.session_id, content));
    }

    pub fn stage(&self, stage: &str, status: &str) {
        self.send(ChatStreamEvent::stage(&self.session_id, stage, status));
    }

    pub fn message(&self, message: &ChatMessage) {
        self.send(ChatStreamEvent::message(&self.session_id, message));
    }

    pub fn done(&self) {
        self.send(ChatStreamEvent::done(&self.session_id));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(ChatStreamEvent::error(&self.session_id, message));
    }
}

/// Response headers required by the flush discipline.
pub fn sse_headers() -> [(axum::http::HeaderName, &'static str); 3] {
    [
        (axum::http::header::CACHE_CONTROL, "no-cache"),
        (axum::http::header::CONNECTION, "keep-alive"),
        (
            axum::http::HeaderName::from_static("x-accel-buffering"),
            "no",
        ),
    ]
}

/// Wrap a drained channel into an SSE body stream.
pub fn event_stream(
    rx: mpsc::UnboundedReceiver<ChatStreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| {
            "{\"type\":\"error\",\"data\":{\"message\":\"serialization failed\"}}".to_string()
        });
        Some((Ok(Event::default().data(payload)), rx))
    });
    Sse::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamEventKind;

    #[tokio::test]
    async fn test_event_ordering_preserved() {
        let (tx, mut rx) = EventSender::channel("sess-1");
        tx.token("进度");
        tx.stage("risk", "running");
        tx.stage("risk", "done");
        tx.message(&ChatMessage::assistant("完成"));
        tx.done();

        let kinds: Vec<StreamEventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                StreamEventKind::Token,
                StreamEventKind::Stage,
                StreamEventKind::Stage,
                StreamEventKind::Message,
                StreamEventKind::Done,
            ]
        );
    }

    #[test]
    fn test_envelope_shape() {
        let event = ChatStreamEvent::token("s1", "- 主张抽取：完成\n");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with("{\"type\":\"token\""));
        assert!(json.contains("\"session_id\":\"s1\""));
    }
}
