//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.regnav/config.json`) and environment.
//! Every field has a default, so an empty `{}` (or a missing file) is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings (the client-facing API surface).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Backend retrieval service the gateway forwards to.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Client-side settings used by the upload manager and chat session.
    #[serde(default)]
    pub client: ClientConfig,
}

/// Gateway bind, port, and inbound body limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Largest inbound request body accepted, in bytes (uploads are buffered whole).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Backend service location and request timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Base URL of the backend. Overridden by SERVER_URL env.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Path prefix appended to the base URL for every forwarded call.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

/// Client settings: where the gateway lives and how long each round-trip may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL of the gateway (`/api/upload` and `/api/chat` are resolved against it).
    #[serde(default = "default_client_base_url")]
    pub base_url: String,

    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,

    /// Assistant turn every chat transcript starts with.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Object fields checked, in order, for the answer text of a successful chat response.
    #[serde(default = "default_answer_fields")]
    pub answer_fields: Vec<String>,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_server_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

fn default_backend_timeout_secs() -> u64 {
    30
}

fn default_client_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_upload_timeout_secs() -> u64 {
    30
}

fn default_chat_timeout_secs() -> u64 {
    90
}

fn default_greeting() -> String {
    "I'm here to help you understand your documents. Ask me anything!".to_string()
}

fn default_answer_fields() -> Vec<String> {
    vec!["answer".to_string(), "content".to_string(), "text".to_string()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            api_prefix: default_api_prefix(),
            timeout_secs: default_backend_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_client_base_url(),
            upload_timeout_secs: default_upload_timeout_secs(),
            chat_timeout_secs: default_chat_timeout_secs(),
            greeting: default_greeting(),
            answer_fields: default_answer_fields(),
        }
    }
}

impl ClientConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }
}

/// Resolve the backend base URL: env SERVER_URL overrides config.
pub fn resolve_server_url(config: &Config) -> String {
    std::env::var("SERVER_URL")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .unwrap_or_else(|| config.backend.server_url.trim().to_string())
}

/// Join base URL and prefix into the root every backend path is appended to.
/// A trailing slash on the base URL is dropped so `http://host/` and `http://host` agree.
pub fn backend_root(server_url: &str, api_prefix: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let prefix = api_prefix.trim_matches('/');
    if prefix.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, prefix)
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("REGNAV_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".regnav").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or REGNAV_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
