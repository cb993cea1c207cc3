use serde::{Deserialize, Serialize};

use crate::message::MessageDraft;

#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Non-streaming reply.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCreate {
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCreated {
    pub chat_id: String,
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatUpdate {
    pub messages: Vec<MessageDraft>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}
