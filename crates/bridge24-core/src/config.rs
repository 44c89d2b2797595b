//! Relay configuration.
//!
//! Loaded once at process start from a TOML file and passed by value into
//! each component; nothing reads configuration through a global accessor.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::BridgeError;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub bitrix24: BitrixConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// When set, log output goes to a daily-rolling file in this directory
    /// instead of stderr.
    #[serde(default)]
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

/// WhatsApp Cloud API credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default)]
    pub business_account_id: String,
    #[serde(default)]
    pub api_token: String,
    /// Shared secret echoed back during the webhook verification handshake.
    #[serde(default)]
    pub webhook_verify_token: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            phone_number_id: String::new(),
            business_account_id: String::new(),
            api_token: String::new(),
            webhook_verify_token: String::new(),
        }
    }
}

/// Bitrix24 REST webhook credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BitrixConfig {
    #[serde(default)]
    pub domain: String,
    /// Inbound webhook base, e.g. `https://example.bitrix24.com/rest/1/token/`.
    #[serde(default)]
    pub webhook_url: String,
    /// Open Channel line the relay posts into.
    #[serde(default)]
    pub open_channel_id: String,
    /// Bitrix24 user the webhook token belongs to.
    #[serde(default)]
    pub user_id: i64,
}

/// HTTP server bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Poll-cycle tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Messages fetched per session per poll cycle.
    #[serde(default = "default_message_limit")]
    pub message_limit: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            message_limit: default_message_limit(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_version() -> String {
    "v18.0".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_message_limit() -> u32 {
    50
}

impl Config {
    /// Report every missing required credential at once.
    ///
    /// Called before `serve`/`poll` so a half-filled config fails up front
    /// instead of on the first upstream call.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let mut missing = Vec::new();

        if self.whatsapp.phone_number_id.is_empty() {
            missing.push("whatsapp.phone_number_id");
        }
        if self.whatsapp.business_account_id.is_empty() {
            missing.push("whatsapp.business_account_id");
        }
        if self.whatsapp.api_token.is_empty() {
            missing.push("whatsapp.api_token");
        }
        if self.whatsapp.webhook_verify_token.is_empty() {
            missing.push("whatsapp.webhook_verify_token");
        }
        if self.bitrix24.domain.is_empty() {
            missing.push("bitrix24.domain");
        }
        if self.bitrix24.webhook_url.is_empty() {
            missing.push("bitrix24.webhook_url");
        }
        if self.bitrix24.open_channel_id.is_empty() {
            missing.push("bitrix24.open_channel_id");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist; `validate()` then
/// reports what is missing.
pub fn load(path: &str) -> Result<Config, BridgeError> {
    let path = Path::new(path);
    if !path.exists() {
        info!("config file not found at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {e}", path.display())))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| BridgeError::Config(format!("failed to parse config: {e}")))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
        [app]
        log_level = "debug"

        [whatsapp]
        phone_number_id = "106540352242922"
        business_account_id = "102290129340398"
        api_token = "EAAG-token"
        webhook_verify_token = "verify-secret"

        [bitrix24]
        domain = "example.bitrix24.com"
        webhook_url = "https://example.bitrix24.com/rest/1/abc123"
        open_channel_id = "3"
        user_id = 1

        [server]
        port = 9090
    "#;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.app.log_level, "info");
        assert_eq!(cfg.whatsapp.api_version, "v18.0");
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.relay.message_limit, 50);
    }

    #[test]
    fn test_full_config_from_toml() {
        let cfg: Config = toml::from_str(FULL_CONFIG).unwrap();
        assert_eq!(cfg.app.log_level, "debug");
        assert_eq!(cfg.whatsapp.phone_number_id, "106540352242922");
        assert_eq!(cfg.whatsapp.api_version, "v18.0", "omitted field keeps its default");
        assert_eq!(cfg.bitrix24.open_channel_id, "3");
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_all_missing_keys() {
        let cfg = Config::default();
        let err = cfg.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("whatsapp.phone_number_id"));
        assert!(msg.contains("whatsapp.api_token"));
        assert!(msg.contains("whatsapp.webhook_verify_token"));
        assert!(msg.contains("bitrix24.domain"));
        assert!(msg.contains("bitrix24.webhook_url"));
        assert!(msg.contains("bitrix24.open_channel_id"));
    }

    #[test]
    fn test_validate_single_missing_key() {
        let mut cfg: Config = toml::from_str(FULL_CONFIG).unwrap();
        cfg.whatsapp.api_token.clear();
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("whatsapp.api_token"));
        assert!(!msg.contains("bitrix24.domain"));
    }
}
