use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};

const DEFAULT_AUTH_SECRET: &str = "change-me-in-production";

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub server_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub top_p: f32,
    /// Hard cap on generated tokens per reply.
    pub max_tokens: usize,
    /// Capacity of the token bridge, in chunks.
    pub stream_buffer: usize,
    /// `None` disables the application-level deadline.
    pub generation_timeout: Option<Duration>,
    pub serialize_generations: bool,
    pub auth_secret: String,
    pub static_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            server_url: "http://localhost:8081".to_string(),
            model_name: "local-model".to_string(),
            temperature: 0.7,
            top_p: 0.95,
            max_tokens: 500,
            stream_buffer: 32,
            generation_timeout: Some(Duration::from_secs(300)),
            serialize_generations: true,
            auth_secret: DEFAULT_AUTH_SECRET.to_string(),
            static_dir: PathBuf::from("./static"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let timeout_secs: u64 = parse_var(
            "GENERATION_TIMEOUT_SECS",
            defaults.generation_timeout.map(|d| d.as_secs()).unwrap_or(0),
        );

        let auth_secret = env::var("AUTH_SECRET").unwrap_or_else(|_| {
            warn!("AUTH_SECRET not set, using the built-in development secret");
            defaults.auth_secret.clone()
        });

        let config = Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parse_var("PORT", defaults.port),
            server_url: env::var("MISTRAL_SERVER_URL").unwrap_or(defaults.server_url),
            model_name: env::var("MODEL_NAME").unwrap_or(defaults.model_name),
            temperature: parse_var("TEMPERATURE", defaults.temperature),
            top_p: parse_var("TOP_P", defaults.top_p),
            max_tokens: parse_var("MAX_TOKENS", defaults.max_tokens),
            stream_buffer: parse_var("STREAM_BUFFER", defaults.stream_buffer).max(1),
            generation_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            serialize_generations: parse_var("SERIALIZE_GENERATIONS", defaults.serialize_generations),
            auth_secret,
            static_dir: env::var("STATIC_DIR").map(PathBuf::from).unwrap_or(defaults.static_dir),
        };

        info!(
            "Configuration: max_tokens={}, stream_buffer={}, timeout={:?}, serialize_generations={}",
            config.max_tokens, config.stream_buffer, config.generation_timeout, config.serialize_generations
        );
        config
    }
}

fn parse_var<T: FromStr + std::fmt::Debug>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("Ignoring malformed {}={:?}, using {:?}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_falls_back_on_garbage() {
        env::set_var("LLAMA_CHAT_TEST_PORT", "not-a-port");
        assert_eq!(parse_var("LLAMA_CHAT_TEST_PORT", 8080u16), 8080);

        env::set_var("LLAMA_CHAT_TEST_PORT", " 9090 ");
        assert_eq!(parse_var("LLAMA_CHAT_TEST_PORT", 8080u16), 9090);

        env::remove_var("LLAMA_CHAT_TEST_PORT");
        assert_eq!(parse_var("LLAMA_CHAT_TEST_PORT", 8080u16), 8080);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.max_tokens, 500);
        assert_eq!(config.stream_buffer, 32);
        assert!(config.serialize_generations);
        assert_eq!(config.generation_timeout, Some(Duration::from_secs(300)));
    }
}
