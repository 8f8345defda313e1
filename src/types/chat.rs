//! Chat session, message and stream-event types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reference card attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReference {
    pub title: String,
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Clickable follow-up attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Link,
    Command,
}

impl ChatAction {
    pub fn link(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Link,
            label: label.into(),
            href: Some(href.into()),
            command: None,
        }
    }

    pub fn command(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Command,
            label: label.into(),
            href: None,
            command: Some(command.into()),
        }
    }
}

/// One chat message. `meta` is a free-form bag the dispatcher uses for
/// record binding and structured blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub actions: Vec<ChatAction>,
    #[serde(default)]
    pub references: Vec<ChatReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl ChatMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            actions: Vec::new(),
            references: Vec::new(),
            meta: None,
        }
    }

    pub fn with_actions(mut self, actions: Vec<ChatAction>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_references(mut self, references: Vec<ChatReference>) -> Self {
        self.references = references;
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Session row, as stored and as returned over the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

/// Closed set of SSE event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventKind {
    Token,
    Stage,
    Message,
    Done,
    Error,
}

/// SSE envelope: `data: {"type": T, "data": D}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatStreamEvent {
    #[serde(rename = "type")]
    pub kind: StreamEventKind,
    pub data: serde_json::Value,
}

impl ChatStreamEvent {
    pub fn token(session_id: &str, content: impl Into<String>) -> Self {
        Self {
            kind: StreamEventKind::Token,
            data: serde_json::json!({"content": content.into(), "session_id": session_id}),
        }
    }

    pub fn stage(session_id: &str, stage: &str, status: &str) -> Self {
        Self {
            kind: StreamEventKind::Stage,
            data: serde_json::json!({"session_id": session_id, "stage": stage, "status": status}),
        }
    }

    pub fn message(session_id: &str, message: &ChatMessage) -> Self {
        Self {
            kind: StreamEventKind::Message,
            data: serde_json::json!({"session_id": session_id, "message": message}),
        }
    }

    pub fn done(session_id: &str) -> Self {
        Self {
            kind: StreamEventKind::Done,
            data: serde_json::json!({"session_id": session_id}),
        }
    }

    pub fn error(session_id: &str, message: impl Into<String>) -> Self {
        Self {
            kind: StreamEventKind::Error,
            data: serde_json::json!({"session_id": session_id, "message": message.into()}),
        }
    }
}

/// Request body for `/chat` and `/chat/stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

/// Response of the non-streaming `/chat` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub assistant_message: ChatMessage,
}
