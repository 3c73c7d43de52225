//! Invocation Wrapper around the quota-limited tool.
//!
//! - `runner` spawns the tool with a wall-clock timeout
//! - `classify` turns a finished run into success, quota exhaustion or failure
//! - `retry` bounds rotation within one logical call
//! - `invoker` ties them to the Account Manager

pub mod classify;
pub mod invoker;
pub mod retry;
pub mod runner;

pub use classify::{AttemptOutcome, QuotaDetector, DEFAULT_QUOTA_PATTERNS};
pub use invoker::{CallError, CallResult, InvocationWrapper, ProbeReport};
pub use retry::RetryState;
pub use runner::{CommandRunner, ProcessOutput, ProcessRunner};
