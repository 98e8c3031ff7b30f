use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (development, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated. Unset allows any origin.
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Advertised document channel URL, overriding the one derived from the request
    pub public_ws_url: Option<String>,

    /// Idle connections are dropped after this many seconds
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    /// Presence records older than this are stale
    #[serde(default = "default_presence_ttl_secs")]
    pub presence_ttl_secs: u64,

    /// Also expire stale presence records on the server
    #[serde(default)]
    pub presence_server_expiry: bool,

    #[serde(default = "default_survey_max_tags")]
    pub survey_max_tags: usize,

    #[serde(default = "default_survey_max_tag_len")]
    pub survey_max_tag_len: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        envy::from_env::<Config>().map_err(ConfigError::EnvError)
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "prod" || self.environment.to_lowercase() == "production"
    }

    pub fn inactivity_window(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_secs)
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            public_ws_url: None,
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            presence_ttl_secs: default_presence_ttl_secs(),
            presence_server_expiry: false,
            survey_max_tags: default_survey_max_tags(),
            survey_max_tag_len: default_survey_max_tag_len(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_inactivity_timeout_secs() -> u64 {
    30 * 60
}

fn default_presence_ttl_secs() -> u64 {
    10
}

fn default_survey_max_tags() -> usize {
    10
}

fn default_survey_max_tag_len() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server_address(), "0.0.0.0:3000");
        assert_eq!(config.inactivity_window(), Duration::from_secs(1800));
        assert_eq!(config.presence_ttl(), Duration::from_secs(10));
        assert!(!config.is_production());
    }

    #[test]
    fn test_cors_origin_list_splits_and_trims() {
        let config = Config {
            cors_origins: Some("http://localhost:5173, http://localhost:3000,,".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.cors_origin_list(),
            vec!["http://localhost:5173".to_string(), "http://localhost:3000".to_string()]
        );
        assert!(Config::default().cors_origin_list().is_empty());
    }
}
