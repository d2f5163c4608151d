mod defaults;


use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::BridgeError;
use defaults::*;

/// Environment variable overriding `api.port`.
pub const ENV_PORT: &str = "PORT";
/// Environment variable overriding the session store directory.
pub const ENV_SESSION_DIR: &str = "WHATSAPP_SESSION_DIR";

/// Top-level wabridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Bearer token for API authentication. Empty = no auth (for local-only use).
    #[serde(default)]
    pub api_key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            api_key: String::new(),
        }
    }
}

/// WhatsApp connection config.
///
/// Credentials live in `session_dir`, or `{data_dir}/wasi-session` when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Session store directory. Empty = derived from `data_dir`.
    #[serde(default)]
    pub session_dir: String,
    /// Fixed wait before reconnecting after an unexpected close.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Connect as soon as the server starts.
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    /// Render pairing QR codes into the log.
    #[serde(default = "default_true")]
    pub print_qr: bool,
    /// Device name shown in the phone's linked-devices list.
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            session_dir: String::new(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            auto_connect: true,
            print_qr: true,
            device_name: default_device_name(),
        }
    }
}

impl WhatsAppConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Config {
    /// Resolved session store directory, with `~` expanded.
    pub fn session_dir(&self) -> PathBuf {
        if self.whatsapp.session_dir.trim().is_empty() {
            Path::new(&shellexpand(&self.bridge.data_dir)).join(SESSION_DIR_NAME)
        } else {
            PathBuf::from(shellexpand(self.whatsapp.session_dir.trim()))
        }
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.whatsapp.reconnect_delay_secs == 0 {
            return Err(BridgeError::Config(
                "whatsapp.reconnect_delay_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` the API binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Apply `PORT` and `WHATSAPP_SESSION_DIR` from the process environment.
    pub fn apply_env(&mut self) -> Result<(), BridgeError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides from an arbitrary lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_PORT).filter(|v| !v.trim().is_empty()) {
            self.api.port = port.trim().parse().map_err(|e| {
                BridgeError::Config(format!("invalid {ENV_PORT} value '{port}': {e}"))
            })?;
        }
        if let Some(dir) = lookup(ENV_SESSION_DIR).filter(|v| !v.trim().is_empty()) {
            self.whatsapp.session_dir = dir;
        }
        Ok(())
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, BridgeError> {
    let path = Path::new(path);
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    parse(&content)
}

/// Parse configuration from TOML text.
pub fn parse(content: &str) -> Result<Config, BridgeError> {
    let cfg: Config = toml::from_str(content)
        .map_err(|e| BridgeError::Config(format!("failed to parse config: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
