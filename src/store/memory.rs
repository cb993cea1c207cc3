use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use uuid::Uuid;

use super::{
    Conversation, ConversationStore, ConversationSummary, User, UserStore, DEFAULT_SYSTEM_PROMPT,
};
use crate::error::{ChatError, ChatResult};
use crate::message::{Message, Role};

fn lock<T>(mutex: &Mutex<T>) -> ChatResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ChatError::Storage("store lock poisoned".to_string()))
}

struct Record {
    conversation: Conversation,
    // Breaks ties between updates that land on the same timestamp.
    revision: u64,
}

#[derive(Default)]
struct Conversations {
    records: HashMap<String, Record>,
    revision: u64,
}

impl Conversations {
    fn owned_mut(&mut self, conversation_id: &str, user_id: &str) -> ChatResult<&mut Record> {
        self.records
            .get_mut(conversation_id)
            .filter(|record| record.conversation.user_id == user_id)
            .ok_or_else(|| ChatError::NotFound("Chat".to_string()))
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

#[derive(Default)]
pub struct MemoryConversationStore {
    inner: Mutex<Conversations>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create(&self, user_id: &str, title: &str) -> ChatResult<String> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            user_id: user_id.to_string(),
            messages: vec![Message::new(Role::System, DEFAULT_SYSTEM_PROMPT)],
            created_at: now,
            updated_at: now,
        };
        let id = conversation.id.clone();

        let mut inner = lock(&self.inner)?;
        let revision = inner.next_revision();
        inner.records.insert(id.clone(), Record { conversation, revision });
        info!("Created chat {} for user {}", id, user_id);
        Ok(id)
    }

    async fn list(&self, user_id: &str) -> ChatResult<Vec<ConversationSummary>> {
        let inner = lock(&self.inner)?;
        let mut owned: Vec<&Record> = inner
            .records
            .values()
            .filter(|record| record.conversation.user_id == user_id)
            .collect();
        owned.sort_by(|a, b| {
            (b.conversation.updated_at, b.revision).cmp(&(a.conversation.updated_at, a.revision))
        });
        Ok(owned
            .into_iter()
            .map(|record| ConversationSummary::from(&record.conversation))
            .collect())
    }

    async fn get(&self, conversation_id: &str, user_id: &str) -> ChatResult<Conversation> {
        let mut inner = lock(&self.inner)?;
        Ok(inner.owned_mut(conversation_id, user_id)?.conversation.clone())
    }

    async fn replace_messages(
        &self,
        conversation_id: &str,
        user_id: &str,
        messages: Vec<Message>,
    ) -> ChatResult<()> {
        let mut inner = lock(&self.inner)?;
        let revision = inner.next_revision();
        let record = inner.owned_mut(conversation_id, user_id)?;
        debug!("Replacing {} messages in chat {}", messages.len(), conversation_id);
        record.conversation.messages = messages;
        record.conversation.updated_at = Utc::now();
        record.revision = revision;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn register(&self, username: &str) -> ChatResult<User> {
        let mut users = lock(&self.users)?;
        if users.contains_key(username) {
            return Err(ChatError::InvalidInput("Username already registered".to_string()));
        }
        let user = User {
            user_id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            created_at: Utc::now(),
        };
        users.insert(username.to_string(), user.clone());
        info!("Registered user {}", username);
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> ChatResult<Option<User>> {
        Ok(lock(&self.users)?.get(username).cloned())
    }
}
