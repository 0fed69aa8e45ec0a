//! Settings loading, environment overrides, and validation.

use super::model::Settings;
use crate::error::{Result, TaskError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Path of a YAML settings file applied by [`Settings::from_env`].
pub const CONFIG_ENV: &str = "TASKRUN_CONFIG";
/// Overrides [`Settings::wrapper`].
pub const WRAPPER_ENV: &str = "TASKRUN_WRAPPER";
/// Overrides [`Settings::watchdog`].
pub const WATCHDOG_ENV: &str = "TASKRUN_WATCHDOG";
/// Disables the watchdog when set to anything but `0` or an empty string.
pub const NO_WATCHDOG_ENV: &str = "TASKRUN_NO_WATCHDOG";

static GLOBAL: OnceLock<Arc<Settings>> = OnceLock::new();

impl Settings {
    /// Load settings from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            TaskError::Config(format!(
                "failed to read settings file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string.
    ///
    /// Unknown fields are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Settings = serde_yaml::from_str(yaml)
            .map_err(|e| TaskError::Config(format!("failed to parse settings YAML: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| TaskError::Config(format!("failed to serialize settings: {}", e)))
    }

    /// Build settings from defaults, an optional `TASKRUN_CONFIG` file, and
    /// the `TASKRUN_*` overrides.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match lookup(CONFIG_ENV).filter(|p| !p.is_empty()) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(wrapper) = lookup(WRAPPER_ENV).filter(|w| !w.is_empty()) {
            settings.wrapper = wrapper;
        }
        if let Some(watchdog) = lookup(WATCHDOG_ENV).filter(|w| !w.is_empty()) {
            settings.watchdog = Some(PathBuf::from(watchdog));
        }
        if let Some(flag) = lookup(NO_WATCHDOG_ENV)
            && !flag.is_empty()
            && flag != "0"
        {
            settings.watchdog_enabled = false;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings values.
    ///
    /// Validation rules:
    /// - `wrapper` must be non-empty
    /// - `unbuffered_marker` must be a `KEY=VALUE` assignment
    /// - `read_chunk_size`, `watchdog_poll_ms`, `kill_grace_ms` must be positive
    pub fn validate(&self) -> Result<()> {
        if self.wrapper.trim().is_empty() {
            return Err(TaskError::Config(
                "settings validation failed: wrapper must not be empty".to_string(),
            ));
        }

        match self.unbuffered_marker.split_once('=') {
            Some((key, _)) if !key.is_empty() => {}
            _ => {
                return Err(TaskError::Config(format!(
                    "settings validation failed: unbuffered_marker must look like KEY=VALUE (found '{}')",
                    self.unbuffered_marker
                )));
            }
        }

        if self.read_chunk_size == 0 {
            return Err(TaskError::Config(
                "settings validation failed: read_chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.watchdog_poll_ms == 0 {
            return Err(TaskError::Config(
                "settings validation failed: watchdog_poll_ms must be greater than 0".to_string(),
            ));
        }
        if self.kill_grace_ms == 0 {
            return Err(TaskError::Config(
                "settings validation failed: kill_grace_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Process-wide settings, built from the environment on first use.
    ///
    /// Invalid environment settings fall back to defaults with a warning; use
    /// [`Settings::from_env`] to observe the error instead.
    pub fn global() -> Arc<Settings> {
        GLOBAL
            .get_or_init(|| {
                let settings = Self::from_env().unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "ignoring invalid taskrun settings");
                    Self::default()
                });
                Arc::new(settings)
            })
            .clone()
    }

    /// Install `settings` as the process-wide default.
    ///
    /// Returns false when the global settings were already initialized.
    pub fn set_global(settings: Settings) -> bool {
        GLOBAL.set(Arc::new(settings)).is_ok()
    }
}
