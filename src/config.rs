//! Global configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Shape of the simulated mesh-processing units of work.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkConfig {
    /// Number of bounded steps each unit of work performs.
    #[serde(default = "default_steps")]
    pub steps: u32,
    /// Duration of a single step; cancellation is observed between steps.
    #[serde(default = "default_step_millis")]
    pub step_millis: u64,
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            step_millis: default_step_millis(),
        }
    }
}

impl WorkConfig {
    /// Duration of one step as a [`Duration`].
    #[must_use]
    pub fn step_duration(&self) -> Duration {
        Duration::from_millis(self.step_millis)
    }
}

fn default_steps() -> u32 {
    100
}

fn default_step_millis() -> u64 {
    20
}

fn default_sweep_interval_ms() -> u64 {
    100
}

fn default_max_draining_sessions() -> usize {
    8
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Interval between periodic sweeps of pending operations.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Upper bound on sessions allowed to drain at once.
    #[serde(default = "default_max_draining_sessions")]
    pub max_draining_sessions: usize,
    /// How long shutdown waits for draining sessions to quiesce.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Simulated work shape.
    #[serde(default)]
    pub work: WorkConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            max_draining_sessions: default_max_draining_sessions(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            work: WorkConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Periodic sweep interval.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Shutdown grace period.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Check invariants that serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(AppError::Config(
                "sweep_interval_ms must be greater than zero".into(),
            ));
        }

        if self.max_draining_sessions == 0 {
            return Err(AppError::Config(
                "max_draining_sessions must be greater than zero".into(),
            ));
        }

        // Workers must observe cancellation at sub-second granularity.
        if self.work.step_millis >= 1000 {
            return Err(AppError::Config(
                "work.step_millis must be below 1000".into(),
            ));
        }

        Ok(())
    }
}
