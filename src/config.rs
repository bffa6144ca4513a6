use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_AUDIT_LOG_CAPACITY: usize = 1000;
pub const CONFIG_FILE_NAME: &str = "config.json";

const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

pub const ENV_JANITOR_INTERVAL: &str = "TIDYFOLD_JANITOR_INTERVAL_SECS";
pub const ENV_MAX_PASSES: &str = "TIDYFOLD_MAX_PASSES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub api_url: String,
    pub api_key_env: String,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            api_url: DEFAULT_API_URL.to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizerConfig {
    /// Upper bound on loose-file iterations per directory visit.
    pub max_loose_file_passes: usize,
    /// Retries after the first attempt of a single-file request.
    pub retry_attempts: usize,
    pub retry_delay_ms: u64,
    pub pacing_delay_ms: u64,
    pub janitor_interval_secs: u64,
    pub include_hidden: bool,
    pub max_transcript_messages: usize,
    pub audit_log_capacity: usize,
    pub refinement_pass: bool,
    pub oracle: OracleSettings,
    pub log_filter: Option<String>,
    pub log_json: bool,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            max_loose_file_passes: 50,
            retry_attempts: 2,
            retry_delay_ms: 1000,
            pacing_delay_ms: 0,
            janitor_interval_secs: 30,
            include_hidden: false,
            max_transcript_messages: 40,
            audit_log_capacity: DEFAULT_AUDIT_LOG_CAPACITY,
            refinement_pass: true,
            oracle: OracleSettings::default(),
            log_filter: None,
            log_json: false,
        }
    }
}

impl OrganizerConfig {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("invalid {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the platform config file when present, defaults otherwise.
    pub fn load_default() -> Result<Self, AppError> {
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "tidyfold", "tidyfold")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), AppError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), AppError> {
        if let Some(value) = lookup(ENV_JANITOR_INTERVAL) {
            self.janitor_interval_secs = parse_override(ENV_JANITOR_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_PASSES) {
            self.max_loose_file_passes = parse_override(ENV_MAX_PASSES, &value)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_loose_file_passes == 0 {
            return Err(AppError::Config(
                "max_loose_file_passes must be at least 1".to_string(),
            ));
        }
        if self.janitor_interval_secs == 0 {
            return Err(AppError::Config(
                "janitor_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.audit_log_capacity == 0 {
            return Err(AppError::Config(
                "audit_log_capacity must be at least 1".to_string(),
            ));
        }
        if self.oracle.model.trim().is_empty() {
            return Err(AppError::Config("oracle.model is empty".to_string()));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{key} must be a non-negative integer, got '{value}'")))
}
