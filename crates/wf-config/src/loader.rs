//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "waflow.toml",
    "./config/config.toml",
    "./config/waflow.toml",
    "/etc/waflow/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self { config_path: Some(path.into()) }
    }

    /// Load configuration from file (if found) with environment variable
    /// overrides.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("WAFLOW_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // HTTP
        if let Ok(val) = env::var("WAFLOW_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
        if let Ok(val) = env::var("WAFLOW_HTTP_HOST") {
            config.http.host = val;
        }
        if let Ok(val) = env::var("WAFLOW_CORS_ORIGINS") {
            config.http.cors_origins = val.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Provider credentials and webhook secrets
        if let Ok(val) = env::var("ACCESS_TOKEN") {
            config.provider.access_token = val;
        }
        if let Ok(val) = env::var("PHONE_NUMBER_ID") {
            config.provider.phone_number_id = val;
        }
        if let Ok(val) = env::var("BUSINESS_ACCOUNT_ID") {
            config.provider.business_account_id = Some(val);
        }
        if let Ok(val) = env::var("VERIFY_TOKEN") {
            config.provider.verify_token = val;
        }
        if let Ok(val) = env::var("APP_SECRET") {
            config.provider.app_secret = Some(val);
        }
        if let Ok(val) = env::var("GRAPH_API_VERSION") {
            config.provider.graph_api_version = val;
        }
        if let Ok(val) = env::var("WAFLOW_PIN_FALLBACK_TENANT") {
            config.provider.pin_fallback_to_first_tenant = val.parse().unwrap_or(false);
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [http]
            port = 9999

            [provider]
            verify_token = "from-file"
            graph_api_version = "v21.0"
            "#
        )
        .unwrap();

        let config = ConfigLoader::with_path(file.path()).load().unwrap();
        assert_eq!(config.http.port, 9999);
        assert_eq!(config.provider.verify_token, "from-file");
        assert_eq!(config.provider.graph_api_version, "v21.0");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ConfigLoader::with_path("/nonexistent/waflow.toml").load().unwrap();
        assert_eq!(config.http.port, 8080);
    }
}
