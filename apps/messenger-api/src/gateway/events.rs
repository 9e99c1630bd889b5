//! Server → client wire payloads.

use serde::Serialize;

use crate::models::message::{Message, MessageReply};

// ---------------------------------------------------------------------------
// Discriminants
// ---------------------------------------------------------------------------

pub const TYPE_INITIAL: &str = "initial";
pub const TYPE_MESSAGE: &str = "message";
pub const TYPE_MESSAGE_REPLY: &str = "message_reply";

// ---------------------------------------------------------------------------
// Broadcast payloads
// ---------------------------------------------------------------------------

/// A persisted root message, fanned out as `{"type":"message","message":{..}}`.
#[derive(Debug, Clone, Serialize)]
pub struct FinalMessage {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub message: Message,
}

impl FinalMessage {
    pub fn new(message: Message) -> Self {
        Self {
            type_: TYPE_MESSAGE,
            message,
        }
    }
}

/// A persisted reply, fanned out as `{"type":"message_reply","message":{..}}`.
#[derive(Debug, Clone, Serialize)]
pub struct FinalMessageReply {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub message: MessageReply,
}

impl FinalMessageReply {
    pub fn new(message: MessageReply) -> Self {
        Self {
            type_: TYPE_MESSAGE_REPLY,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Direct replies
// ---------------------------------------------------------------------------

/// History sent only to the connection that asked for it.
#[derive(Debug, Serialize)]
pub struct InitialMessages {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub messages: Vec<Message>,
}

impl InitialMessages {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            type_: TYPE_INITIAL,
            messages,
        }
    }
}

/// `{"error": "<description>"}` sent to the originating connection.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Encoded frame. A plain string field cannot fail to serialize.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from(r#"{"error":"internal error"}"#))
    }
}
