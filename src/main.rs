use actix_files as fs;
use actix_web::middleware::Logger;
use actix_web::{web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{info, warn};

use llama_chat_stream::config::AppConfig;
use llama_chat_stream::web::routes;
use llama_chat_stream::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting llama chat server");

    let config = AppConfig::from_env();
    let app_state = Data::new(AppState::from_config(&config));

    let static_dir = config.static_dir.clone();
    let serve_static = static_dir.is_dir();
    if !serve_static {
        warn!("Static directory {} not found, /static is disabled", static_dir.display());
    }

    info!("Listening on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let mut app = App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(routes::configure);
        if serve_static {
            app = app.service(fs::Files::new("/static", static_dir.clone()));
        }
        app
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}
