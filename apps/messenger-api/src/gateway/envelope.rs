//! Client → server envelope decoding.
//!
//! Inbound frames are JSON objects tagged by `type` (`kind` is accepted as an
//! alias). Decoding is pure and total: every input yields either a fully
//! validated [`Envelope`] or an [`EnvelopeError`], so handlers never see a
//! partially decoded request.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use super::events::{TYPE_INITIAL, TYPE_MESSAGE, TYPE_MESSAGE_REPLY};
use crate::models::message::{Message, MessageReply};

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// `{"type":"initial","chat_id":<int>}`
    Initial { chat_id: i64 },
    /// `{"type":"message","message":{..}}`
    Message(Message),
    /// `{"type":"message_reply","message":{.., "ParentMessageId":<int>}}`
    Reply(MessageReply),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("invalid message type")]
    InvalidEnvelope,

    #[error("invalid chat_id")]
    InvalidChatId,

    #[error("invalid message format: {0} is missing or invalid")]
    InvalidMessageFormat(&'static str),
}

impl Envelope {
    /// The wire discriminant this envelope was decoded from.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Initial { .. } => TYPE_INITIAL,
            Envelope::Message(_) => TYPE_MESSAGE,
            Envelope::Reply(_) => TYPE_MESSAGE_REPLY,
        }
    }

    /// Decode a raw text frame.
    pub fn parse_text(text: &str) -> Result<Self, EnvelopeError> {
        let raw: Value = serde_json::from_str(text).map_err(|_| EnvelopeError::InvalidEnvelope)?;
        Self::parse(&raw)
    }

    /// Decode an already JSON-decoded payload.
    pub fn parse(raw: &Value) -> Result<Self, EnvelopeError> {
        let obj = raw.as_object().ok_or(EnvelopeError::InvalidEnvelope)?;
        let kind = obj
            .get("type")
            .or_else(|| obj.get("kind"))
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::InvalidEnvelope)?;

        match kind {
            TYPE_INITIAL => {
                let chat_id = integer(obj.get("chat_id")).ok_or(EnvelopeError::InvalidChatId)?;
                Ok(Envelope::Initial { chat_id })
            }
            TYPE_MESSAGE => {
                let fields = MessageFields::extract(nested_message(obj)?)?;
                Ok(Envelope::Message(fields.into_message()))
            }
            TYPE_MESSAGE_REPLY => {
                let data = nested_message(obj)?;
                let fields = MessageFields::extract(data)?;
                let parent = required_int(data, "ParentMessageId")?;
                Ok(Envelope::Reply(fields.into_reply(parent)))
            }
            _ => Err(EnvelopeError::InvalidEnvelope),
        }
    }
}

/// Fields shared by root messages and replies.
struct MessageFields {
    message_id: i64,
    author_id: i64,
    timestamp: DateTime<Utc>,
    receiver_id: i64,
    text: String,
    chat_id: i64,
    is_edited: bool,
}

impl MessageFields {
    fn extract(data: &Map<String, Value>) -> Result<Self, EnvelopeError> {
        let message_id = required_int(data, "MessageId")?;
        let author_id = required_int(data, "AuthorId")?;
        let seconds = required_int(data, "Timestamp")?;
        let timestamp = DateTime::from_timestamp(seconds, 0)
            .ok_or(EnvelopeError::InvalidMessageFormat("Timestamp"))?;
        let receiver_id = required_int(data, "ReceiverId")?;
        let chat_id = required_int(data, "ChatId")?;
        let text = data
            .get("Message")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::InvalidMessageFormat("Message"))?
            .to_string();
        // Absent or non-boolean means not edited.
        let is_edited = data
            .get("IsEdited")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            message_id,
            author_id,
            timestamp,
            receiver_id,
            text,
            chat_id,
            is_edited,
        })
    }

    fn into_message(self) -> Message {
        Message {
            message_id: self.message_id,
            author_id: self.author_id,
            timestamp: self.timestamp,
            receiver_id: self.receiver_id,
            message: self.text,
            chat_id: self.chat_id,
            is_edited: self.is_edited,
            parent_message_id: None,
        }
    }

    fn into_reply(self, parent_message_id: i64) -> MessageReply {
        MessageReply {
            message_id: self.message_id,
            author_id: self.author_id,
            timestamp: self.timestamp,
            receiver_id: self.receiver_id,
            message: self.text,
            chat_id: self.chat_id,
            is_edited: self.is_edited,
            parent_message_id,
        }
    }
}

fn nested_message(obj: &Map<String, Value>) -> Result<&Map<String, Value>, EnvelopeError> {
    obj.get("message")
        .and_then(Value::as_object)
        .ok_or(EnvelopeError::InvalidMessageFormat("message"))
}

fn required_int(data: &Map<String, Value>, key: &'static str) -> Result<i64, EnvelopeError> {
    integer(data.get(key)).ok_or(EnvelopeError::InvalidMessageFormat(key))
}

/// JSON numbers may arrive as floats; truncate toward zero.
pub(crate) fn integer(value: Option<&Value>) -> Option<i64> {
    let Value::Number(n) = value? else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}
