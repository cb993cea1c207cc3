pub mod auth;
pub mod config;
pub mod error;
pub mod inference;
pub mod message;
pub mod model;
pub mod store;
pub mod web;

use std::sync::Arc;

use auth::Identity;
use config::AppConfig;
use inference::GenerationWorker;
use model::ModelManager;
use store::{ConversationStore, MemoryConversationStore, MemoryUserStore, UserStore};

// App state structure
pub struct AppState {
    pub worker: GenerationWorker,
    pub conversations: Arc<dyn ConversationStore>,
    pub users: Arc<dyn UserStore>,
    pub identity: Identity,
}

impl AppState {
    /// In-memory stores around the given worker.
    pub fn new(worker: GenerationWorker, auth_secret: &str) -> Self {
        let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
        Self {
            worker,
            conversations: Arc::new(MemoryConversationStore::new()),
            identity: Identity::new(auth_secret, Arc::clone(&users)),
            users,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let model = Arc::new(ModelManager::from_config(config));
        let worker = GenerationWorker::from_config(model, config);
        Self::new(worker, &config.auth_secret)
    }
}
