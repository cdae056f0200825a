//! Configuration
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied via `apply_overrides`)
//! 2. Environment variables (`HEALTHSYNC_*`)
//! 3. Config file (`--config PATH`, else `healthsync.toml` in the working directory)
//! 4. Compiled defaults

use crate::error::SyncError;
use crate::session::{SessionPolicy, DEFAULT_SESSION_DEADLINE, DEFAULT_SOURCE_TIMEOUT};
use crate::types::{Difficulty, RecordConfig};
use crate::upload::UPLOAD_PATH;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "healthsync.toml";

pub const ENV_SERVER_URL: &str = "HEALTHSYNC_SERVER_URL";
pub const ENV_USER_ID: &str = "HEALTHSYNC_USER_ID";
pub const ENV_AUTH_TOKEN: &str = "HEALTHSYNC_AUTH_TOKEN";
pub const ENV_DIFFICULTY: &str = "HEALTHSYNC_DIFFICULTY";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub server: ServerConfig,
    pub record: RecordDefaults,
    pub session: SessionSettings,
}

/// Aggregator endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub upload_path: String,
    /// Request timeout; transport default when unset
    pub request_timeout_secs: Option<u64>,
    /// Sent as a bearer token when set
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000".to_string(),
            upload_path: UPLOAD_PATH.to_string(),
            request_timeout_secs: None,
            auth_token: None,
        }
    }
}

/// Values stamped onto every record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordDefaults {
    pub user_id: String,
    pub difficulty: Difficulty,
    pub duration_min: u32,
}

impl Default for RecordDefaults {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            difficulty: Difficulty::Medium,
            duration_min: 30,
        }
    }
}

/// Collection time budget; 0 disables a limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub source_timeout_ms: u64,
    pub deadline_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            source_timeout_ms: DEFAULT_SOURCE_TIMEOUT.as_millis() as u64,
            deadline_ms: DEFAULT_SESSION_DEADLINE.as_millis() as u64,
        }
    }
}

/// CLI override arguments that can be applied to a config
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub user_id: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub duration_min: Option<u32>,
    pub source_timeout_ms: Option<u64>,
    pub deadline_ms: Option<u64>,
}

impl SyncConfig {
    /// Load with file and environment layers applied
    pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, SyncError> {
        let content = std::fs::read_to_string(path).map_err(|e| SyncError::IoError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
            .map_err(|e| SyncError::ConfigError(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self, SyncError> {
        toml::from_str(content).map_err(|e| SyncError::ConfigError(e.to_string()))
    }

    /// Apply environment overrides, reading variables through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SERVER_URL) {
            self.server.url = url;
        }
        if let Some(user_id) = lookup(ENV_USER_ID) {
            self.record.user_id = user_id;
        }
        if let Some(token) = lookup(ENV_AUTH_TOKEN) {
            self.server.auth_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(difficulty) = lookup(ENV_DIFFICULTY) {
            self.record.difficulty = difficulty
                .parse()
                .map_err(|e| SyncError::ConfigError(format!("{ENV_DIFFICULTY}: {e}")))?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(url) = &overrides.server_url {
            self.server.url = url.clone();
        }
        if let Some(user_id) = &overrides.user_id {
            self.record.user_id = user_id.clone();
        }
        if let Some(difficulty) = overrides.difficulty {
            self.record.difficulty = difficulty;
        }
        if let Some(duration) = overrides.duration_min {
            self.record.duration_min = duration;
        }
        if let Some(ms) = overrides.source_timeout_ms {
            self.session.source_timeout_ms = ms;
        }
        if let Some(ms) = overrides.deadline_ms {
            self.session.deadline_ms = ms;
        }
    }

    /// Full upload URL
    pub fn endpoint(&self) -> String {
        join_url(&self.server.url, &self.server.upload_path)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.server.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn session_policy(&self) -> SessionPolicy {
        let limit = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        SessionPolicy {
            source_timeout: limit(self.session.source_timeout_ms),
            deadline: limit(self.session.deadline_ms),
        }
    }

    /// Record settings for one upload, with an optional explicit date
    pub fn record_config(&self, date: Option<&str>) -> Result<RecordConfig, SyncError> {
        let config = RecordConfig::new(self.record.user_id.clone())
            .with_difficulty(self.record.difficulty)
            .with_duration(self.record.duration_min);
        match date {
            Some(date) if !date.is_empty() => config.with_date(date),
            _ => Ok(config),
        }
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
