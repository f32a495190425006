use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_refresh_credential_ttl_days")]
    pub refresh_credential_ttl_days: i64,

    /// Overrides the credential file location
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

fn default_server_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_refresh_credential_ttl_days() -> i64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            request_timeout_secs: default_request_timeout_secs(),
            refresh_credential_ttl_days: default_refresh_credential_ttl_days(),
            credentials_path: None,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("HABITAT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let settings = Config::builder()
            .add_source(File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("HABITAT").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server_url.is_empty() {
            return Err("server_url is required".to_string());
        }
        if !self.server_url.starts_with("http") {
            return Err("server_url must be a valid HTTP(S) URL".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than zero".to_string());
        }
        if self.refresh_credential_ttl_days <= 0 {
            return Err("refresh_credential_ttl_days must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_credential_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_credential_ttl_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
        assert_eq!(settings.refresh_credential_ttl(), chrono::Duration::days(30));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let settings = Settings {
            server_url: "ftp://example.com".into(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
