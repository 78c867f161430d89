// Configuration constants for the server

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    /// Must outlast the pool's stream timeout or long jobs get cut off.
    pub request_timeout_secs: u64,
    pub max_text_length: usize,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub pool_config_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 360,
            max_text_length: 200,
            cors_allowed_origins: None,
            pool_config_path: "config/pool.json".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let rate_limit_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let max_text_length = std::env::var("MAX_TEXT_LENGTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_text_length);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        let pool_config_path = std::env::var("TTS_POOL_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(defaults.pool_config_path);

        Self {
            port,
            rate_limit_per_minute,
            request_timeout_secs,
            max_text_length,
            cors_allowed_origins,
            pool_config_path,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
