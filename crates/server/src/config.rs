use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a number")]
    InvalidPort,
}

/// Server configuration from environment variables (`.env` honored via
/// dotenvy in `main`). The Anthropic API key is read by the client itself.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub model: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort)?,
            Err(_) => 3001,
        };
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:tracklite.db".to_string());
        let model = std::env::var("ANTHROPIC_MODEL").ok();

        Ok(Self {
            host,
            port,
            database_url,
            model,
        })
    }
}
