//! Waflow Configuration System
//!
//! TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub provider: ProviderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.verify_token.is_empty() {
            return Err(ConfigError::ValidationError(
                "provider.verify_token must be set (VERIFY_TOKEN)".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_origins: vec![],
        }
    }
}

/// Provider (WhatsApp Cloud API) configuration.
///
/// `access_token` and `phone_number_id` are tenant-wide fallbacks used to
/// seed the default tenant in single-tenant deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub access_token: String,
    pub phone_number_id: String,
    pub business_account_id: Option<String>,
    pub verify_token: String,
    pub app_secret: Option<String>,
    pub graph_api_version: String,
    /// When true, inbound deliveries for `phone_number_id` that resolve no
    /// tenant fall back to the first tenant.
    pub pin_fallback_to_first_tenant: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            business_account_id: None,
            verify_token: String::new(),
            app_secret: None,
            graph_api_version: "v20.0".to_string(),
            pin_fallback_to_first_tenant: false,
        }
    }
}
