//! Invocation Wrapper: runs the wrapped tool and rotates accounts on quota
//! exhaustion.

use super::classify::{AttemptOutcome, QuotaDetector};
use super::retry::{QuotaDecision, RetryState, RotationDecision};
use super::runner::{CommandRunner, ProcessRunner};
use crate::account::{AccountHealth, AccountManager, SwitchReason};
use crate::config::WrapperConfig;
use crate::error::RotationError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Terminal failure of a logical call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("all accounts exhausted their quota")]
    AllAccountsExhausted,
    #[error("retry limit reached before a usable account was found")]
    RetryLimitReached,
    #[error("{0}")]
    OtherFailure(String),
    #[error("no accounts available")]
    NoAccountsAvailable,
    #[error("account rotation failed: {0}")]
    Rotation(String),
}

/// Aggregated result of one logical call across all its attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub success: bool,
    pub output: String,
    pub error: Option<CallError>,
    /// Failure text of the last attempt, if it failed.
    pub last_failure: Option<String>,
    pub attempts: u32,
    pub accounts_tried: Vec<u32>,
}

impl CallResult {
    fn succeeded(output: String, retry: &RetryState) -> Self {
        Self {
            success: true,
            output,
            error: None,
            last_failure: None,
            attempts: retry.attempts(),
            accounts_tried: retry.tried().to_vec(),
        }
    }

    fn failed(error: CallError, last_failure: Option<String>, retry: Option<&RetryState>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
            last_failure,
            attempts: retry.map_or(0, |r| r.attempts()),
            accounts_tried: retry.map_or_else(Vec::new, |r| r.tried().to_vec()),
        }
    }
}

/// Per-account result of [`InvocationWrapper::probe_accounts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub account: u32,
    pub success: bool,
    pub quota_exhausted: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

pub struct InvocationWrapper<R = CommandRunner> {
    manager: AccountManager,
    runner: R,
    detector: QuotaDetector,
    max_retries: u32,
    default_timeout: Duration,
}

impl InvocationWrapper<CommandRunner> {
    /// Builds a wrapper that spawns the configured command.
    pub fn from_config(manager: AccountManager, config: &WrapperConfig) -> anyhow::Result<Self> {
        let runner = CommandRunner::new(config.command.clone(), config.args.clone());
        let detector =
            QuotaDetector::new(config.quota_patterns.as_slice(), config.timeout_is_quota)?;
        Ok(Self::new(manager, runner, detector)
            .with_max_retries(config.max_retries)
            .with_default_timeout(config.timeout()))
    }
}

impl<R: ProcessRunner> InvocationWrapper<R> {
    pub fn new(manager: AccountManager, runner: R, detector: QuotaDetector) -> Self {
        Self {
            manager,
            runner,
            detector,
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            default_timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn manager(&self) -> &AccountManager {
        &self.manager
    }

    /// Runs a blocking manager operation off the async runtime.
    async fn manager_op<T, F>(&self, op: F) -> Result<T, RotationError>
    where
        F: FnOnce(&AccountManager) -> Result<T, RotationError> + Send + 'static,
        T: Send + 'static,
    {
        let manager = self.manager.clone();
        match tokio::task::spawn_blocking(move || op(&manager)).await {
            Ok(result) => result,
            Err(e) => Err(RotationError::Storage(format!("rotation task failed: {}", e))),
        }
    }

    async fn record(&self, account: u32, health: AccountHealth) {
        if let Err(e) = self
            .manager_op(move |m| m.record_outcome(account, health))
            .await
        {
            tracing::warn!("Failed to record outcome for account {}: {}", account, e);
        }
    }

    async fn attempt(&self, input: &str, timeout: Duration) -> AttemptOutcome {
        match self.runner.run(input, timeout).await {
            Ok(output) => self.detector.classify(&output),
            Err(e) => AttemptOutcome::OtherFailure {
                error: format!("{:#}", e),
            },
        }
    }

    /// Runs the wrapped tool, rotating to the next account on every quota
    /// exhaustion until one succeeds or the bounds are hit.
    pub async fn call(&self, input: &str, timeout: Option<Duration>) -> CallResult {
        let timeout = timeout.unwrap_or(self.default_timeout);

        let mut account = match self.manager_op(|m| m.ensure_active()).await {
            Ok(id) => id,
            Err(RotationError::NoAccountsAvailable) => {
                return CallResult::failed(CallError::NoAccountsAvailable, None, None)
            }
            Err(e) => return CallResult::failed(CallError::Rotation(e.to_string()), None, None),
        };
        let known = match self.manager_op(|m| m.known_ids()).await {
            Ok(ids) => ids.len(),
            Err(e) => return CallResult::failed(CallError::Rotation(e.to_string()), None, None),
        };

        let mut retry = RetryState::new(self.max_retries, known);
        loop {
            retry.begin_attempt(account);
            tracing::debug!("Attempt {} using account {}", retry.attempts(), account);

            let error = match self.attempt(input, timeout).await {
                AttemptOutcome::Succeeded { output } => {
                    self.record(account, AccountHealth::Healthy).await;
                    return CallResult::succeeded(output, &retry);
                }
                AttemptOutcome::OtherFailure { error } => {
                    tracing::warn!("Account {} failed: {}", account, error);
                    self.record(account, AccountHealth::Failed { error: error.clone() })
                        .await;
                    return CallResult::failed(
                        CallError::OtherFailure(error.clone()),
                        Some(error),
                        Some(&retry),
                    );
                }
                AttemptOutcome::QuotaExhausted { error } => error,
            };

            tracing::warn!("Account {} exhausted its quota: {}", account, error);
            self.record(account, AccountHealth::Exhausted { error: error.clone() })
                .await;

            if let QuotaDecision::Stop(stop) = retry.on_quota_exhausted() {
                return CallResult::failed(stop, Some(error), Some(&retry));
            }

            match self
                .manager_op(|m| m.switch_next(SwitchReason::AutoQuota))
                .await
            {
                Ok((switched, next)) => match retry.on_rotated(switched, next) {
                    RotationDecision::Retry { account: next } => account = next,
                    RotationDecision::Stop(stop) => {
                        return CallResult::failed(stop, Some(error), Some(&retry))
                    }
                },
                Err(e) => {
                    tracing::warn!("Rotation after quota exhaustion failed: {}", e);
                    return CallResult::failed(
                        retry.on_rotation_failed(),
                        Some(error),
                        Some(&retry),
                    );
                }
            }
        }
    }

    /// Like [`call`](Self::call), but returns `fallback_message` on any failure.
    pub async fn call_with_fallback(
        &self,
        input: &str,
        fallback_message: &str,
        timeout: Option<Duration>,
    ) -> String {
        let result = self.call(input, timeout).await;
        if result.success {
            return result.output;
        }
        if let Some(error) = &result.error {
            tracing::warn!(
                "Call failed after {} attempt(s), using fallback: {}",
                result.attempts,
                error
            );
        }
        fallback_message.to_string()
    }

    /// Activates each account in turn and runs `input` once against it.
    pub async fn probe_accounts(
        &self,
        input: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<ProbeReport>, RotationError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let ids = self.manager_op(|m| m.known_ids()).await?;
        let mut reports = Vec::with_capacity(ids.len());

        for id in ids {
            tracing::info!("Probing account {}", id);
            if let Err(e) = self
                .manager_op(move |m| m.switch_to(id, SwitchReason::Probe))
                .await
            {
                reports.push(ProbeReport {
                    account: id,
                    success: false,
                    quota_exhausted: false,
                    output: None,
                    error: Some(e.to_string()),
                });
                continue;
            }

            let report = match self.attempt(input, timeout).await {
                AttemptOutcome::Succeeded { output } => {
                    self.record(id, AccountHealth::Healthy).await;
                    ProbeReport {
                        account: id,
                        success: true,
                        quota_exhausted: false,
                        output: Some(output),
                        error: None,
                    }
                }
                AttemptOutcome::QuotaExhausted { error } => {
                    self.record(id, AccountHealth::Exhausted { error: error.clone() })
                        .await;
                    ProbeReport {
                        account: id,
                        success: false,
                        quota_exhausted: true,
                        output: None,
                        error: Some(error),
                    }
                }
                AttemptOutcome::OtherFailure { error } => {
                    self.record(id, AccountHealth::Failed { error: error.clone() })
                        .await;
                    ProbeReport {
                        account: id,
                        success: false,
                        quota_exhausted: false,
                        output: None,
                        error: Some(error),
                    }
                }
            };
            reports.push(report);
        }

        Ok(reports)
    }
}

#[cfg(test)]
#[path = "tests/invoker_tests.rs"]
mod tests;
