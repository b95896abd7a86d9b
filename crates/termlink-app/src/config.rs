//! `termlink.toml` loading. Every field has a default and a missing file is
//! the same as an empty one; command-line flags override what is loaded.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use termlink_pty::BridgeConfig;
use termlink_session::channel::DEFAULT_MAX_BUFFERED;
use termlink_session::ChannelConfig;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub client: ClientConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub endpoint: String,
    /// Submissions held while connecting before the oldest are evicted.
    pub max_buffered_messages: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8080/session".to_string(),
            max_buffered_messages: DEFAULT_MAX_BUFFERED,
        }
    }
}

impl ClientConfig {
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            max_buffered: self.max_buffered_messages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    /// The only path websocket upgrades are accepted on.
    pub path: String,
    /// `None` runs `$SHELL`, or `/bin/sh` when that is unset.
    pub shell: Option<String>,
    pub term: String,
    pub max_message_size: usize,
    pub handshake_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            path: termlink_session::DEFAULT_SESSION_PATH.to_string(),
            shell: None,
            term: "xterm-256color".to_string(),
            max_message_size: 64 * 1024,
            handshake_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            shell: self.shell.clone(),
            term: self.term.clone(),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config =
            toml::from_str(&text).with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(config)
    }
}
