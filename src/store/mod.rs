mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatResult;
use crate::message::Message;

pub use memory::{MemoryConversationStore, MemoryUserStore};

/// Seed message for every new conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "chat_id")]
    pub id: String,
    pub title: String,
    pub user_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub chat_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            chat_id: conversation.id.clone(),
            title: conversation.title.clone(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

/// Persistence for user-owned conversations.
///
/// Every call is scoped to `user_id`; a conversation owned by someone else
/// behaves exactly like one that does not exist.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the new conversation's id.
    async fn create(&self, user_id: &str, title: &str) -> ChatResult<String>;

    /// Most recently updated first.
    async fn list(&self, user_id: &str) -> ChatResult<Vec<ConversationSummary>>;

    async fn get(&self, conversation_id: &str, user_id: &str) -> ChatResult<Conversation>;

    /// Swaps the whole message sequence and refreshes `updated_at`, or
    /// changes nothing.
    async fn replace_messages(
        &self,
        conversation_id: &str,
        user_id: &str,
        messages: Vec<Message>,
    ) -> ChatResult<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `InvalidInput` if the username is taken.
    async fn register(&self, username: &str) -> ChatResult<User>;

    async fn find_by_username(&self, username: &str) -> ChatResult<Option<User>>;
}
