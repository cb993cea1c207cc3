use actix_web::web::Bytes;
use actix_web::{web, HttpResponse, Responder};
use futures::StreamExt;
use log::info;
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::error::{ChatError, ChatResult};
use crate::inference::build_prompt;
use crate::message::{validate_messages, MessageDraft};
use crate::web::models::{
    ChatCreate, ChatCreated, ChatResponse, ChatUpdate, Credentials, StatusResponse, TokenResponse,
};
use crate::AppState;

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

fn normalized_username(credentials: &Credentials) -> ChatResult<&str> {
    let username = credentials.username.trim();
    if username.is_empty() {
        return Err(ChatError::InvalidInput("username must not be empty".to_string()));
    }
    Ok(username)
}

pub async fn register(
    data: web::Data<AppState>,
    req: web::Json<Credentials>,
) -> ChatResult<HttpResponse> {
    let username = normalized_username(&req)?;
    let user = data.users.register(username).await?;
    let token = data.identity.issue(&user)?;
    Ok(HttpResponse::Ok().json(TokenResponse::bearer(token)))
}

pub async fn login(
    data: web::Data<AppState>,
    req: web::Json<Credentials>,
) -> ChatResult<HttpResponse> {
    let username = normalized_username(&req)?;
    let user = data
        .users
        .find_by_username(username)
        .await?
        .ok_or_else(|| ChatError::Auth("Invalid username".to_string()))?;
    let token = data.identity.issue(&user)?;
    info!("User {} logged in", user.username);
    Ok(HttpResponse::Ok().json(TokenResponse::bearer(token)))
}

/// Streams the assistant's next reply as plain text, one chunk per token.
///
/// Validation and auth failures are answered with an error status before any
/// generation starts. A failure after the first byte aborts the body instead.
pub async fn chat(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    req: web::Json<Vec<MessageDraft>>,
) -> ChatResult<HttpResponse> {
    let (messages, prompt) = build_prompt(req.into_inner())?;
    info!(
        "Chat request from user {} with {} messages (max_tokens: {})",
        user.username,
        messages.len(),
        data.worker.max_tokens()
    );

    let body = data
        .worker
        .generate(prompt)
        .map(|chunk| chunk.map(Bytes::from));

    Ok(HttpResponse::Ok().content_type("text/plain").streaming(body))
}

pub async fn chat_complete(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    req: web::Json<Vec<MessageDraft>>,
) -> ChatResult<HttpResponse> {
    let (messages, prompt) = build_prompt(req.into_inner())?;
    info!("Non-streaming chat request from user {} with {} messages", user.username, messages.len());

    let response = data.worker.complete(prompt).await?;
    info!("Response length: {} characters", response.len());
    Ok(HttpResponse::Ok().json(ChatResponse { response }))
}

pub async fn create_chat(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    req: web::Json<ChatCreate>,
) -> ChatResult<HttpResponse> {
    let ChatCreate { title } = req.into_inner();
    let chat_id = data.conversations.create(&user.user_id, &title).await?;
    Ok(HttpResponse::Ok().json(ChatCreated { chat_id, title }))
}

pub async fn list_chats(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
) -> ChatResult<HttpResponse> {
    let chats = data.conversations.list(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(chats))
}

pub async fn get_chat(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> ChatResult<HttpResponse> {
    let chat = data.conversations.get(&path, &user.user_id).await?;
    Ok(HttpResponse::Ok().json(chat))
}

pub async fn update_chat(
    data: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    req: web::Json<ChatUpdate>,
) -> ChatResult<HttpResponse> {
    let messages = validate_messages(req.into_inner().messages)?;
    data.conversations
        .replace_messages(&path, &user.user_id, messages)
        .await?;
    Ok(HttpResponse::Ok().json(StatusResponse {
        status: "updated".to_string(),
    }))
}
