use std::env;

use crate::caption::DEFAULT_BASE_URL;
use crate::error::ApiError;

const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Listening port
    pub port: u16,

    /// OpenRouter API key. Optional at startup; caption requests fail with a
    /// configuration error until it is set.
    pub api_key: Option<String>,

    /// OpenRouter API base URL
    pub base_url: String,

    /// Default log level when RUST_LOG is not set
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ApiError> {
        let port = match env::var("PORT") {
            Ok(value) => value
                .parse()
                .map_err(|_| ApiError::Configuration(format!("invalid PORT value: {value}")))?,
            Err(_) => DEFAULT_PORT,
        };

        let api_key = env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());

        let base_url =
            env::var("OPENROUTER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            port,
            api_key,
            base_url,
            log_level,
        })
    }
}
