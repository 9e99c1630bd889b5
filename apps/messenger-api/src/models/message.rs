use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::base_chatmessage;

/// A stored chat message. Root messages carry no parent.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = base_chatmessage)]
pub struct Message {
    pub message_id: i64,
    pub author_id: i64,
    pub timestamp: DateTime<Utc>,
    pub receiver_id: i64,
    #[diesel(column_name = content)]
    pub message: String,
    pub chat_id: i64,
    pub is_edited: bool,
    #[diesel(column_name = parent_id)]
    pub parent_message_id: Option<i64>,
}

/// A threaded reply. Unlike [`Message`] the parent is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageReply {
    pub message_id: i64,
    pub author_id: i64,
    pub timestamp: DateTime<Utc>,
    pub receiver_id: i64,
    pub message: String,
    pub chat_id: i64,
    pub is_edited: bool,
    pub parent_message_id: i64,
}

impl From<MessageReply> for Message {
    fn from(reply: MessageReply) -> Self {
        Self {
            message_id: reply.message_id,
            author_id: reply.author_id,
            timestamp: reply.timestamp,
            receiver_id: reply.receiver_id,
            message: reply.message,
            chat_id: reply.chat_id,
            is_edited: reply.is_edited,
            parent_message_id: Some(reply.parent_message_id),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = base_chatmessage)]
pub struct NewChatMessage<'a> {
    pub message_id: i64,
    pub content: &'a str,
    pub timestamp: DateTime<Utc>,
    pub author_id: i64,
    pub chat_id: i64,
    pub receiver_id: i64,
    pub is_edited: bool,
    pub parent_id: Option<i64>,
}

impl<'a> From<&'a Message> for NewChatMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        Self {
            message_id: msg.message_id,
            content: &msg.message,
            timestamp: msg.timestamp,
            author_id: msg.author_id,
            chat_id: msg.chat_id,
            receiver_id: msg.receiver_id,
            is_edited: msg.is_edited,
            parent_id: msg.parent_message_id,
        }
    }
}

impl<'a> From<&'a MessageReply> for NewChatMessage<'a> {
    fn from(reply: &'a MessageReply) -> Self {
        Self {
            message_id: reply.message_id,
            content: &reply.message,
            timestamp: reply.timestamp,
            author_id: reply.author_id,
            chat_id: reply.chat_id,
            receiver_id: reply.receiver_id,
            is_edited: reply.is_edited,
            parent_id: Some(reply.parent_message_id),
        }
    }
}
