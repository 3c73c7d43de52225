use crate::account::DEFAULT_LOCK_TIMEOUT;
use crate::wrapper::{QuotaDetector, DEFAULT_QUOTA_PATTERNS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RotationConfig {
    /// Upper bound on waiting for the rotation lock. Default: 10
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    #[serde(default)]
    pub wrapper: WrapperConfig,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: default_lock_timeout_secs(),
            wrapper: WrapperConfig::default(),
        }
    }
}

fn default_lock_timeout_secs() -> u64 {
    DEFAULT_LOCK_TIMEOUT.as_secs()
}

/// How to run the wrapped tool and when to rotate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WrapperConfig {
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments placed before the input, which is always passed last.
    #[serde(default)]
    pub args: Vec<String>,
    /// Wall-clock timeout per attempt. Default: 120
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Rotations allowed within one call. Default: 3
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Treat a timed-out attempt as quota exhaustion. Default: false
    #[serde(default)]
    pub timeout_is_quota: bool,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    /// Case-insensitive regexes matched against stdout and stderr.
    #[serde(default = "default_quota_patterns")]
    pub quota_patterns: Vec<String>,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            timeout_is_quota: false,
            fallback_message: default_fallback_message(),
            quota_patterns: default_quota_patterns(),
        }
    }
}

fn default_command() -> String {
    "qwen".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_fallback_message() -> String {
    "Service temporarily unavailable.".to_string()
}

fn default_quota_patterns() -> Vec<String> {
    DEFAULT_QUOTA_PATTERNS.iter().map(|p| p.to_string()).collect()
}

impl WrapperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RotationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.wrapper.command.trim().is_empty() {
            anyhow::bail!("wrapper.command must not be empty");
        }
        if self.wrapper.timeout_secs == 0 {
            anyhow::bail!("wrapper.timeout_secs must be greater than zero");
        }
        QuotaDetector::new(
            self.wrapper.quota_patterns.as_slice(),
            self.wrapper.timeout_is_quota,
        )
        .context("wrapper.quota_patterns contains an invalid pattern")?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
