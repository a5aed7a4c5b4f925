//! Runtime configuration for pipeline assembly and execution.

use crate::errors::{GenflowError, PipelineValidationError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use crate::pipeline::{BackoffStrategy, JitterStrategy, RetryConfig};

/// Configuration shared by every pipeline an assembler builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenflowConfig {
    /// How long the await step waits for an execution callback, in seconds.
    #[serde(default = "default_await_timeout")]
    pub await_timeout_seconds: f64,
    /// Total budget of one cleanup pass, in seconds.
    #[serde(default = "default_cleanup_timeout")]
    pub cleanup_timeout_seconds: f64,
    /// Retry policy for transient source failures at step boundaries.
    #[serde(default)]
    pub step_retry: RetryConfig,
}

/// Upper bound of every timeout, in seconds (30 days).
pub const MAX_TIMEOUT_SECONDS: f64 = 30.0 * 24.0 * 3600.0;

fn default_await_timeout() -> f64 {
    3600.0
}

fn default_cleanup_timeout() -> f64 {
    30.0
}

impl Default for GenflowConfig {
    fn default() -> Self {
        Self {
            await_timeout_seconds: default_await_timeout(),
            cleanup_timeout_seconds: default_cleanup_timeout(),
            step_retry: RetryConfig::default(),
        }
    }
}

impl GenflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from JSON. Unknown keys are ignored.
    pub fn from_json(json: &str) -> Result<Self, GenflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the await timeout.
    #[must_use]
    pub fn with_await_timeout(mut self, seconds: f64) -> Self {
        self.await_timeout_seconds = seconds;
        self
    }

    /// Sets the cleanup timeout.
    #[must_use]
    pub fn with_cleanup_timeout(mut self, seconds: f64) -> Self {
        self.cleanup_timeout_seconds = seconds;
        self
    }

    /// Sets the step retry policy.
    #[must_use]
    pub fn with_step_retry(mut self, retry: RetryConfig) -> Self {
        self.step_retry = retry;
        self
    }

    /// Gets the await timeout as a Duration.
    pub fn await_timeout(&self) -> Result<Duration, GenflowError> {
        to_duration("await_timeout_seconds", self.await_timeout_seconds)
    }

    /// Gets the cleanup timeout as a Duration.
    pub fn cleanup_timeout(&self) -> Result<Duration, GenflowError> {
        to_duration("cleanup_timeout_seconds", self.cleanup_timeout_seconds)
    }

    /// Rejects timeouts outside `(0, MAX_TIMEOUT_SECONDS]` and zero attempts.
    pub fn validate(&self) -> Result<(), GenflowError> {
        self.await_timeout()?;
        self.cleanup_timeout()?;
        if self.step_retry.max_attempts == 0 {
            return Err(
                PipelineValidationError::new("step_retry.max_attempts must be at least 1").into(),
            );
        }
        Ok(())
    }
}

fn to_duration(name: &str, seconds: f64) -> Result<Duration, GenflowError> {
    let invalid = || {
        PipelineValidationError::new(format!(
            "{name} must be a positive number of seconds up to {MAX_TIMEOUT_SECONDS}, got {seconds}"
        ))
    };
    if !seconds.is_finite() || seconds <= 0.0 || seconds > MAX_TIMEOUT_SECONDS {
        return Err(invalid().into());
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| invalid().into())
}
