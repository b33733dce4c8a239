use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::room::MAX_SESSIONS;

/// Config file looked up in the working directory.
pub const CONFIG_FILE: &str = "gridshare.toml";

/// Top-level server configuration, loaded from `gridshare.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub web_root: String,
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            web_root: "web".to_string(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Room and connection limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Sessions admitted into the room at once.
    pub max_sessions: usize,
    /// Outbound frames queued per session before broadcasts to it are dropped.
    pub session_message_buffer: usize,
    /// Close a connection that has sent nothing for this long. Unset means
    /// connections are only closed by the transport.
    pub idle_timeout_secs: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: MAX_SESSIONS,
            session_message_buffer: 256,
            idle_timeout_secs: None,
        }
    }
}

impl LimitsConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidListenAddr(String),
    ZeroLimit(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidListenAddr(addr) => {
                write!(f, "listen_addr is not a valid socket address: {addr}")
            },
            Self::ZeroLimit(name) => write!(f, "{name} must be > 0"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidListenAddr(self.listen_addr.clone()));
        }
        if self.limits.max_sessions == 0 {
            return Err(ConfigError::ZeroLimit("limits.max_sessions"));
        }
        if self.limits.session_message_buffer == 0 {
            return Err(ConfigError::ZeroLimit("limits.session_message_buffer"));
        }
        if self.limits.idle_timeout_secs == Some(0) {
            return Err(ConfigError::ZeroLimit("limits.idle_timeout_secs"));
        }
        if self.limits.idle_timeout_secs.is_none() {
            tracing::warn!(
                "No idle timeout configured; a peer that vanishes without closing keeps its slot"
            );
        }
        Ok(())
    }

    /// Load config from `gridshare.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string(CONFIG_FILE) {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from {CONFIG_FILE}");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse {CONFIG_FILE}: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No {CONFIG_FILE} found, using defaults");
                ServerConfig::default()
            },
        };

        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply environment overrides. `GRIDSHARE_LISTEN_ADDR` wins over `PORT`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            self.listen_addr = format!("0.0.0.0:{port}");
        }
        if let Some(addr) = var("GRIDSHARE_LISTEN_ADDR")
            && !addr.is_empty()
        {
            self.listen_addr = addr;
        }
        if let Some(root) = var("GRIDSHARE_WEB_ROOT")
            && !root.is_empty()
        {
            self.web_root = root;
        }
        if let Some(val) = var("GRIDSHARE_MAX_SESSIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.limits.max_sessions = n;
        }
        if let Some(val) = var("GRIDSHARE_IDLE_TIMEOUT_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            self.limits.idle_timeout_secs = Some(n);
        }
    }
}
