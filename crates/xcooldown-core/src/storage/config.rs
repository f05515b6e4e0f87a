//! TOML-based application configuration.
//!
//! Stores the tunables of the ritual:
//! - Escalation ladder, reset window and unlock window
//! - Reflection and countdown settings
//! - The gated selector allow-list
//!
//! Configuration is stored at `~/.config/xcooldown/config.toml`.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::cooldown::EscalationPolicy;
use crate::error::ConfigError;
use crate::gate::DEFAULT_SELECTORS;

/// Escalation ladder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_ladder_secs")]
    pub ladder_secs: Vec<u64>,
    #[serde(default = "default_reset_window_minutes")]
    pub reset_window_minutes: u64,
    #[serde(default = "default_unlock_window_secs")]
    pub unlock_window_secs: u64,
}

/// Ritual presentation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RitualConfig {
    #[serde(default = "default_min_reflection_chars")]
    pub min_reflection_chars: usize,
    /// Countdown polling interval.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_reflection_limit")]
    pub reflection_limit: usize,
}

/// Which page elements get gated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_selectors")]
    pub selectors: Vec<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/xcooldown/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub ritual: RitualConfig,
    #[serde(default)]
    pub gate: GateConfig,
}

fn default_ladder_secs() -> Vec<u64> {
    vec![60, 300, 900, 1800]
}
fn default_reset_window_minutes() -> u64 {
    30
}
fn default_unlock_window_secs() -> u64 {
    15
}
fn default_min_reflection_chars() -> usize {
    12
}
fn default_tick_interval_ms() -> u64 {
    500
}
fn default_reflection_limit() -> usize {
    50
}
fn default_selectors() -> Vec<String> {
    DEFAULT_SELECTORS.iter().map(|s| s.to_string()).collect()
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            ladder_secs: default_ladder_secs(),
            reset_window_minutes: default_reset_window_minutes(),
            unlock_window_secs: default_unlock_window_secs(),
        }
    }
}

impl Default for RitualConfig {
    fn default() -> Self {
        Self {
            min_reflection_chars: default_min_reflection_chars(),
            tick_interval_ms: default_tick_interval_ms(),
            reflection_limit: default_reflection_limit(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            selectors: default_selectors(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return (and persist) the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or is
    /// invalid, or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path. Only a missing file is replaced by the
    /// default; any other read failure is reported.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let load_failed = |message: String| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message,
        };
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| load_failed(e.to_string()))?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(load_failed(e.to_string())),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|err| {
            tracing::warn!(%err, "falling back to default config");
            Self::default()
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without persisting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed, or
    /// the resulting config is invalid.
    pub fn set_in_memory(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and persist.
    ///
    /// # Errors
    ///
    /// See [`Config::set_in_memory`]; also fails if the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_in_memory(key, value)?;
        self.save()
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ladder = &self.escalation.ladder_secs;
        if ladder.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "escalation.ladder_secs".into(),
                message: "ladder must have at least one rung".into(),
            });
        }
        if ladder.windows(2).any(|w| w[1] < w[0]) {
            return Err(ConfigError::InvalidValue {
                key: "escalation.ladder_secs".into(),
                message: "ladder must be non-decreasing".into(),
            });
        }
        if let Some(rung) = ladder.iter().find(|secs| secs.checked_mul(1000).is_none()) {
            return Err(ConfigError::InvalidValue {
                key: "escalation.ladder_secs".into(),
                message: format!("rung of {rung}s is out of range"),
            });
        }
        if self
            .escalation
            .reset_window_minutes
            .checked_mul(60_000)
            .is_none()
        {
            return Err(ConfigError::InvalidValue {
                key: "escalation.reset_window_minutes".into(),
                message: "out of range".into(),
            });
        }
        if self.escalation.unlock_window_secs.checked_mul(1000).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "escalation.unlock_window_secs".into(),
                message: "out of range".into(),
            });
        }
        if self.ritual.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ritual.tick_interval_ms".into(),
                message: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn policy(&self) -> EscalationPolicy {
        EscalationPolicy {
            ladder_secs: self.escalation.ladder_secs.clone(),
            reset_window: Duration::from_secs(
                self.escalation.reset_window_minutes.saturating_mul(60),
            ),
            unlock_window: Duration::from_secs(self.escalation.unlock_window_secs),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.ritual.tick_interval_ms)
    }
}
