use chrono::{DateTime, Utc};
use diesel::sql_types::{BigInt, Nullable, Text, Timestamptz};
use diesel::QueryableByName;
use serde::Serialize;

/// Latest message of one chat, as listed on the chat-list endpoint.
#[derive(Debug, Clone, PartialEq, QueryableByName, Serialize)]
pub struct ChatSummary {
    #[diesel(sql_type = BigInt)]
    pub chat_id: i64,
    #[diesel(sql_type = Text)]
    pub message_content: String,
    #[diesel(sql_type = Timestamptz)]
    pub message_timestamp: DateTime<Utc>,
    #[diesel(sql_type = BigInt)]
    pub message_receiver_id: i64,
    #[diesel(sql_type = Nullable<Text>)]
    pub message_receiver_username: Option<String>,
}
