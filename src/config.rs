//! Config loading and environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP/WS listener binds to.
    pub listen_addr: String,
    /// SQLite database path.
    pub database: PathBuf,
    pub obs: ObsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            database: PathBuf::from("timeloom.db"),
            obs: ObsConfig::default(),
        }
    }
}

/// Stage-control (OBS) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObsConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Scene switched to by the convenience trigger and the event pipeline.
    pub default_scene: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4455,
            password: String::new(),
            default_scene: "Scene 2".to_string(),
            connect_timeout_ms: 3_000,
            request_timeout_ms: 2_000,
            backoff_base_ms: 250,
            backoff_max_ms: 5_000,
        }
    }
}

impl ObsConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Environment variables win over file values. The OBS names match what the
/// stage crew already exports for their other tooling.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(listen) = env_var("TIMELOOM_LISTEN") {
        config.listen_addr = listen;
    }
    if let Some(db) = env_var("TIMELOOM_DB") {
        config.database = PathBuf::from(db);
    }
    if let Some(host) = env_var("OBS_IP") {
        config.obs.host = host;
    }
    if let Some(port) = env_var("OBS_PORT").and_then(|p| p.parse().ok()) {
        config.obs.port = port;
    }
    if let Some(password) = env_var("OBS_PASSWORD") {
        config.obs.password = password;
    }
    if let Some(scene) = env_var("OBS_SCENE_2_NAME") {
        config.obs.default_scene = scene;
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
