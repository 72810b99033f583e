//! Process configuration read from the environment
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::relay::RelayMode;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_STATIC_DIR: &str = "public";
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:3001/ws";

#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub port: u16,
    pub static_dir: PathBuf,
    pub mode: RelayMode,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            mode: RelayMode::default(),
        }
    }
}

impl RelayConfig {
    /// `PORT`, `GROOVEBOX_STATIC_DIR` and `GROOVEBOX_RELAY_MODE`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        if let Some(dir) = lookup("GROOVEBOX_STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        if let Some(mode) = lookup("GROOVEBOX_RELAY_MODE") {
            config.mode = mode.parse()?;
        }

        Ok(config)
    }
}

/// Relay endpoint for the desktop groovebox (`GROOVEBOX_RELAY_URL`)
pub fn relay_url_from_env() -> String {
    std::env::var("GROOVEBOX_RELAY_URL").unwrap_or_else(|_| DEFAULT_RELAY_URL.to_string())
}
