//! Client configuration types for Parley.
//!
//! `ClientConfig` represents `config.toml` in the data directory. Every field
//! has a default, so an empty file (or no file) is a valid configuration.

use serde::{Deserialize, Serialize};

use std::path::PathBuf;
use std::time::Duration;

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the REST persistence service.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Websocket URL of the push channel.
    #[serde(default = "default_push_url")]
    pub push_url: String,

    /// The signed-in user. The `--user` flag takes precedence.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Environment variable holding the bearer credential.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// File holding the bearer credential, re-read before every handshake.
    #[serde(default)]
    pub token_file: Option<PathBuf>,

    /// Reconnection attempts after a mid-session transport failure.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Fixed delay between reconnection attempts, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Silence after which the local "typing" signal is withdrawn.
    #[serde(default = "default_typing_idle_ms")]
    pub typing_idle_ms: u64,

    /// Silence after which a counterpart's "typing" indicator expires.
    #[serde(default = "default_remote_typing_ttl_ms")]
    pub remote_typing_ttl_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_push_url() -> String {
    "ws://localhost:3000/ws".to_string()
}

fn default_token_env() -> String {
    "PARLEY_TOKEN".to_string()
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_typing_idle_ms() -> u64 {
    2_000
}

fn default_remote_typing_ttl_ms() -> u64 {
    5_000
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl ClientConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    pub fn remote_typing_ttl(&self) -> Duration {
        Duration::from_millis(self.remote_typing_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            push_url: default_push_url(),
            user_id: None,
            token_env: default_token_env(),
            token_file: None,
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            typing_idle_ms: default_typing_idle_ms(),
            remote_typing_ttl_ms: default_remote_typing_ttl_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
