use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    /// Malformed request, rejected before any generation starts.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    /// Missing, or owned by somebody else. The two are deliberately indistinguishable.
    #[error("{0} not found")]
    NotFound(String),

    /// Model or tokenizer fault. Once streaming has started this can only be
    /// reported as a terminal stream event.
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ResponseError for ChatError {
    fn status_code(&self) -> StatusCode {
        match self {
            ChatError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ChatError::Auth(_) => StatusCode::UNAUTHORIZED,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Generation(_) | ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
