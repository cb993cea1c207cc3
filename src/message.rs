use serde::{Deserialize, Serialize};

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

impl Role {
    /// Label used when the role is rendered into a prompt.
    pub fn label(self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A message as it arrives over the wire, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDraft {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
}

impl From<Message> for MessageDraft {
    fn from(message: Message) -> Self {
        Self {
            role: Some(message.role),
            content: Some(message.content),
        }
    }
}

impl TryFrom<MessageDraft> for Message {
    type Error = ChatError;

    fn try_from(draft: MessageDraft) -> Result<Self, Self::Error> {
        let role = draft
            .role
            .ok_or_else(|| ChatError::InvalidInput("message is missing a role".to_string()))?;
        let content = draft
            .content
            .ok_or_else(|| ChatError::InvalidInput("message is missing its content".to_string()))?;
        Ok(Message { role, content })
    }
}

/// Validates a whole list, failing on the first malformed entry.
pub fn validate_messages(drafts: Vec<MessageDraft>) -> Result<Vec<Message>, ChatError> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| {
            Message::try_from(draft).map_err(|err| match err {
                ChatError::InvalidInput(reason) => {
                    ChatError::InvalidInput(format!("message {}: {}", index, reason))
                }
                other => other,
            })
        })
        .collect()
}
