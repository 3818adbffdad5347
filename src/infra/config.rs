// src/infra/config.rs — Configuration loading (TOML file + environment)

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Connection settings for the Harmony collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Worker identity reported on session start.
    pub worker_id: String,
    /// Bearer credential for the collector.
    pub api_key: String,
    /// Collector base URL. Empty disables tracking.
    pub api_url: String,
    /// Per-call timeout for start/heartbeat/end.
    pub timeout_secs: u64,
    /// How long a finished task waits for in-flight heartbeats before ending the session.
    pub heartbeat_drain_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            worker_id: String::new(),
            api_key: String::new(),
            api_url: String::new(),
            timeout_secs: 10,
            heartbeat_drain_secs: 2,
        }
    }
}

impl TrackingConfig {
    pub fn enabled(&self) -> bool {
        !self.api_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Root agent name, used as the default author of content fragments.
    pub name: String,
    pub model: String,
    pub instruction: String,
    #[serde(default)]
    pub google_api_key: Option<String>,
    pub api_base: String,
    pub max_tool_rounds: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "harmony_agent".into(),
            model: "gemini-2.5-flash".into(),
            instruction: "You are a Harmony AI assistant. You can help with shopping, \
                          orders, inventory and delivery scheduling. Always be helpful and concise."
                .into(),
            google_api_key: None,
            api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            max_tool_rounds: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            log_level: "info".into(),
        }
    }
}

impl Config {
    /// Load config: `HARMONY_CONFIG` file if set, then environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("HARMONY_CONFIG") {
            Ok(path) if !path.is_empty() => Self::load_from(Path::new(&path))?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using `lookup` as the variable source.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("HARMONY_AGENT_ID") {
            self.tracking.worker_id = v;
        }
        if let Some(v) = get("HARMONY_API_KEY") {
            self.tracking.api_key = v;
        }
        if let Some(v) = get("HARMONY_API_URL") {
            self.tracking.api_url = v;
        }
        if let Some(v) = get("HARMONY_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.tracking.timeout_secs = v;
        }
        if let Some(v) = get("HARMONY_MODEL") {
            self.agent.model = v;
        }
        if let Some(v) = get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY")) {
            self.agent.google_api_key = Some(v);
        }
        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = v;
        }

        self.tracking.api_url = self.tracking.api_url.trim_end_matches('/').to_string();
    }

    /// Copy of the config with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        let mut c = self.clone();
        if !c.tracking.api_key.is_empty() {
            c.tracking.api_key = "***".into();
        }
        if c.agent.google_api_key.is_some() {
            c.agent.google_api_key = Some("***".into());
        }
        c
    }
}
