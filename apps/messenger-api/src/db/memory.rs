use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::db::repository::MessageRepository;
use crate::error::RepositoryError;
use crate::models::chat::ChatSummary;
use crate::models::message::{Message, MessageReply};

// ---------------------------------------------------------------------------
// In-memory implementation (for local runs without Postgres / tests)
// ---------------------------------------------------------------------------

/// Messages keyed by chat id. Writes fail while `failing` is set.
///
/// Message ids are unique across every chat and a reply's parent must already
/// exist, matching the primary and foreign keys of `base_chatmessage`.
pub struct MemoryRepository {
    chats: DashMap<i64, Vec<Message>>,
    ids: DashMap<i64, i64>,
    usernames: DashMap<i64, String>,
    failing: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            chats: DashMap::new(),
            ids: DashMap::new(),
            usernames: DashMap::new(),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn add_user(&self, id: i64, username: impl Into<String>) {
        self.usernames.insert(id, username.into());
    }

    /// Total number of stored messages across all chats.
    pub fn len(&self) -> usize {
        self.chats.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("store unavailable".to_string()));
        }
        Ok(())
    }

    fn insert(&self, message: Message) -> Result<(), RepositoryError> {
        if let Some(parent) = message.parent_message_id {
            if !self.ids.contains_key(&parent) {
                return Err(RepositoryError::Constraint(format!("parent message {parent} does not exist")));
            }
        }

        // Holding the id entry serializes concurrent inserts of the same id.
        match self.ids.entry(message.message_id) {
            Entry::Occupied(_) => Err(RepositoryError::Constraint(format!(
                "duplicate message id {}",
                message.message_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(message.chat_id);
                self.chats.entry(message.chat_id).or_default().push(message);
                Ok(())
            }
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRepository for MemoryRepository {
    async fn save_message(&self, message: &Message) -> Result<(), RepositoryError> {
        self.check_available()?;
        self.insert(message.clone())
    }

    async fn save_message_reply(&self, reply: &MessageReply) -> Result<(), RepositoryError> {
        self.check_available()?;
        self.insert(reply.clone().into())
    }

    async fn load_messages(&self, chat_id: i64) -> Result<Vec<Message>, RepositoryError> {
        self.check_available()?;
        let mut messages = self
            .chats
            .get(&chat_id)
            .map(|chat| chat.value().clone())
            .unwrap_or_default();
        messages.sort_by_key(|m| (m.timestamp, m.message_id));
        Ok(messages)
    }

    async fn load_user_chats(&self, user_id: i64) -> Result<Vec<ChatSummary>, RepositoryError> {
        self.check_available()?;
        let mut chats: Vec<ChatSummary> = self
            .chats
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|m| m.author_id == user_id)
                    .max_by_key(|m| (m.timestamp, m.message_id))
                    .map(|latest| ChatSummary {
                        chat_id: latest.chat_id,
                        message_content: latest.message.clone(),
                        message_timestamp: latest.timestamp,
                        message_receiver_id: latest.receiver_id,
                        message_receiver_username: self
                            .usernames
                            .get(&latest.receiver_id)
                            .map(|u| u.value().clone()),
                    })
            })
            .collect();
        chats.sort_by(|a, b| b.message_timestamp.cmp(&a.message_timestamp));
        Ok(chats)
    }
}
