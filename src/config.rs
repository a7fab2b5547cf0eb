use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub upstream: UpstreamSettings,
    pub session: SessionSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Settings for the upstream streaming transcription service.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    /// WebSocket URL of the transcription service
    pub url: String,

    /// Service credential, sent as an Authorization header and scrubbed
    /// from any payload forwarded to clients
    pub credential: String,

    /// Recognition parameters (language, model, formatting options).
    /// Treated as opaque and appended to the connection URL.
    #[serde(default)]
    pub recognition: serde_json::Value,

    /// Seconds to wait for the service's open confirmation
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Whether an upstream error before the connection ever reached
    /// readiness ends the session (recoverable notification otherwise)
    #[serde(default = "default_true")]
    pub terminate_on_early_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Keepalive ping period in seconds. A client that misses a full
    /// cycle (no pong between two ticks) is terminated as unresponsive.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// Skip token verification and admit everyone as `debug_principal`
    #[serde(default)]
    pub bypass: bool,

    #[serde(default = "default_debug_principal")]
    pub debug_principal: String,

    /// Static token table used by `SharedKeyAdmission`
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub principal_id: String,
    /// Usage balance in seconds at admission time
    pub remaining_secs: f64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_keepalive_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_debug_principal() -> String {
    "dev".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SCRIBE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
