//! Connection settings: server address and player credentials.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host of the relay used when a server is reached through the companion proxy.
pub const PROXY_HOST: &str = "companion-rust.facepunch.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One player's pairing credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerToken {
    pub player_id: u64,
    pub player_token: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default)]
    pub tokens: Vec<PlayerToken>,
}

impl ConnectionConfig {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            use_proxy: false,
            tokens: Vec::new(),
        }
    }

    pub fn add_token(mut self, player_id: u64, player_token: i32) -> Self {
        self.tokens.push(PlayerToken {
            player_id,
            player_token,
        });
        self
    }

    /// The credential stamped on every request: the first configured token.
    pub fn credential(&self) -> Option<PlayerToken> {
        self.tokens.first().copied()
    }

    pub fn url(&self) -> String {
        if self.use_proxy {
            format!("wss://{PROXY_HOST}/game/{}/{}", self.ip, self.port)
        } else {
            format!("ws://{}:{}", self.ip, self.port)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ip.trim().is_empty() {
            return Err(ConfigError::Invalid("ip must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".into()));
        }
        Ok(())
    }
}
