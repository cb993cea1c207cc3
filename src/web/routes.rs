use actix_web::web;

use crate::error::ChatError;
use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| ChatError::InvalidInput(err.to_string()).into());

    cfg.app_data(json_config)
        .service(
            web::scope("/api")
                .route("/register", web::post().to(handlers::register))
                .route("/login", web::post().to(handlers::login))
                .route("/chat", web::post().to(handlers::chat))
                .route("/chat/complete", web::post().to(handlers::chat_complete))
                .route("/chats", web::post().to(handlers::create_chat))
                .route("/chats", web::get().to(handlers::list_chats))
                .route("/chats/{chat_id}", web::get().to(handlers::get_chat))
                .route("/chats/{chat_id}", web::put().to(handlers::update_chat)),
        )
        .route("/health", web::get().to(handlers::health_check));
}
