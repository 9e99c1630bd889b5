//! Message persistence used by the chat gateway.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel_async::RunQueryDsl;

use crate::db::pool::DbPool;
use crate::db::schema::base_chatmessage;
use crate::error::RepositoryError;
use crate::models::chat::ChatSummary;
use crate::models::message::{Message, MessageReply, NewChatMessage};

/// Storage capability consumed by the dispatch loop.
///
/// Implementations must be safe for concurrent use from every connection.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn save_message(&self, message: &Message) -> Result<(), RepositoryError>;
    async fn save_message_reply(&self, reply: &MessageReply) -> Result<(), RepositoryError>;
    /// All messages of a chat, oldest first.
    async fn load_messages(&self, chat_id: i64) -> Result<Vec<Message>, RepositoryError>;
    /// Latest message of every chat the user authored in, newest first.
    async fn load_user_chats(&self, user_id: i64) -> Result<Vec<ChatSummary>, RepositoryError>;
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

pub struct PgMessageRepository {
    db: DbPool,
}

impl PgMessageRepository {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn insert(&self, row: NewChatMessage<'_>) -> Result<(), RepositoryError> {
        let mut conn = self.db.get().await?;
        diesel::insert_into(base_chatmessage::table)
            .values(row)
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

const USER_CHATS_QUERY: &str = r#"
    SELECT DISTINCT ON (m.chat_id)
        m.chat_id,
        m.content AS message_content,
        m.timestamp AS message_timestamp,
        m.receiver_id AS message_receiver_id,
        u.username AS message_receiver_username
    FROM base_chatmessage AS m
    LEFT JOIN base_user AS u ON m.receiver_id = u.id
    WHERE m.author_id = $1
    ORDER BY m.chat_id, m.timestamp DESC, m.message_id DESC
"#;

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn save_message(&self, message: &Message) -> Result<(), RepositoryError> {
        self.insert(NewChatMessage::from(message)).await
    }

    async fn save_message_reply(&self, reply: &MessageReply) -> Result<(), RepositoryError> {
        self.insert(NewChatMessage::from(reply)).await
    }

    async fn load_messages(&self, chat_id: i64) -> Result<Vec<Message>, RepositoryError> {
        let mut conn = self.db.get().await?;
        let messages = base_chatmessage::table
            .filter(base_chatmessage::chat_id.eq(chat_id))
            .order((
                base_chatmessage::timestamp.asc(),
                base_chatmessage::message_id.asc(),
            ))
            .select(Message::as_select())
            .load(&mut conn)
            .await?;
        Ok(messages)
    }

    async fn load_user_chats(&self, user_id: i64) -> Result<Vec<ChatSummary>, RepositoryError> {
        let mut conn = self.db.get().await?;
        let mut chats: Vec<ChatSummary> = diesel::sql_query(USER_CHATS_QUERY)
            .bind::<BigInt, _>(user_id)
            .load(&mut conn)
            .await?;
        // DISTINCT ON forces chat_id ordering; present newest chats first.
        chats.sort_by(|a, b| b.message_timestamp.cmp(&a.message_timestamp));
        Ok(chats)
    }
}
