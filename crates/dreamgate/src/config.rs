use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::capability::Capability;
use crate::session::ChannelCapacity;

/// Config file used when neither `--config` nor `DREAMGATE_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "dreamgate.yaml";

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub user: UserConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    /// Load the config file at `path`. A missing file yields defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::parse(&contents)
    }

    /// Parse config text after environment expansion.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_keep_alive_interval() -> u64 {
    15
}

fn default_upstream_address() -> String {
    "http://127.0.0.1:50051".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_attributes() -> HashMap<String, String> {
    HashMap::from([("source".to_string(), "dreamgate".to_string())])
}

fn default_channel_capacity() -> usize {
    16
}

fn default_user_id() -> String {
    "default-user".to_string()
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in config text.
///
/// Supported syntax:
/// - `${VAR}` - required, errors if unset
/// - `${VAR:-default}` - falls back to `default` (which may be empty)
/// - `$$` - literal `$`
///
/// A `$` not followed by `{` or `$` is kept as is. Nested references are not
/// supported.
///
/// ```yaml
/// upstream:
///   address: ${CAPABILITY_ADDR:-http://127.0.0.1:50051}
/// user:
///   id: ${DREAMGATE_USER}
/// ```
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next();
                let mut reference = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    reference.push(c);
                }
                if !closed {
                    return Err(ConfigError::UnclosedVarReference);
                }
                result.push_str(&resolve_var_reference(&reference)?);
            }
            _ => result.push('$'),
        }
    }

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_reference(reference: &str) -> Result<String, ConfigError> {
    let (name, default) = match reference.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (reference, None),
    };

    match (std::env::var(name), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Applies to non-streaming routes only.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_seconds: u64,
    /// Directory with a built single-page app to serve.
    #[serde(default)]
    pub static_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            keep_alive_interval_seconds: default_keep_alive_interval(),
            static_path: None,
        }
    }
}

// ============================================================================
// UpstreamConfig
// ============================================================================

/// Capability service connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_address")]
    pub address: String,
    /// Deadline for the liveness handshake.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Attributes sent with every stream config, below any request values.
    #[serde(default = "default_attributes")]
    pub default_attributes: HashMap<String, String>,
    #[serde(default)]
    pub event_types: EventTypes,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: default_upstream_address(),
            probe_timeout_ms: default_probe_timeout_ms(),
            default_attributes: default_attributes(),
            event_types: EventTypes::default(),
        }
    }
}

impl UpstreamConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn event_type(&self, capability: Capability) -> &str {
        match capability {
            Capability::Transcribe => &self.event_types.transcribe,
            Capability::Translate => &self.event_types.translate,
            Capability::Summarize => &self.event_types.summarize,
            Capability::Chat => &self.event_types.chat,
        }
    }
}

/// Upstream event type per capability.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventTypes {
    pub transcribe: String,
    pub translate: String,
    pub summarize: String,
    pub chat: String,
}

impl Default for EventTypes {
    fn default() -> Self {
        Self {
            transcribe: "pcas.transcribe.stream.v1".to_string(),
            translate: "pcas.translate.stream.v1".to_string(),
            summarize: "pcas.summarize.stream.v1".to_string(),
            chat: "pcas.chat.stream.v1".to_string(),
        }
    }
}

// ============================================================================
// SessionsConfig
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_channel_capacity")]
    pub inbound_capacity: usize,
    #[serde(default = "default_channel_capacity")]
    pub outbound_capacity: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: default_channel_capacity(),
            outbound_capacity: default_channel_capacity(),
        }
    }
}

impl SessionsConfig {
    pub fn capacity(&self) -> ChannelCapacity {
        ChannelCapacity {
            inbound: self.inbound_capacity,
            outbound: self.outbound_capacity,
        }
    }
}

// ============================================================================
// UserConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// Owner of published memory events.
    #[serde(default = "default_user_id")]
    pub id: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
