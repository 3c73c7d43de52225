//! Retry-with-rotation bookkeeping for a single logical call.
//!
//! Pure state: attempt count, accounts tried and the bounds. The wrapper
//! feeds it quota failures and rotation results; it answers whether to
//! rotate, retry or stop.

use super::CallError;

/// What the wrapper should do after a quota-exhausted attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Ask the Account Manager for the next account.
    Rotate,
    Stop(CallError),
}

/// What the wrapper should do after a rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationDecision {
    Retry { account: u32 },
    Stop(CallError),
}

#[derive(Debug, Clone)]
pub struct RetryState {
    max_retries: u32,
    known_accounts: usize,
    attempts: u32,
    tried: Vec<u32>,
}

impl RetryState {
    pub fn new(max_retries: u32, known_accounts: usize) -> Self {
        Self {
            max_retries,
            known_accounts,
            attempts: 0,
            tried: Vec::new(),
        }
    }

    /// Records the start of an attempt on `account`.
    pub fn begin_attempt(&mut self, account: u32) {
        self.attempts += 1;
        if !self.tried.contains(&account) {
            self.tried.push(account);
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn tried(&self) -> &[u32] {
        &self.tried
    }

    /// Decides whether a quota-exhausted attempt may rotate and retry.
    pub fn on_quota_exhausted(&self) -> QuotaDecision {
        if self.attempts as usize >= self.known_accounts {
            QuotaDecision::Stop(CallError::AllAccountsExhausted)
        } else if self.attempts > self.max_retries {
            QuotaDecision::Stop(CallError::RetryLimitReached)
        } else {
            QuotaDecision::Rotate
        }
    }

    /// Decides what follows a `switch_next` result.
    ///
    /// A no-op switch or a landing on an account already tried in this call
    /// means every reachable account is exhausted.
    pub fn on_rotated(&self, switched: bool, account: u32) -> RotationDecision {
        if !switched || self.tried.contains(&account) {
            RotationDecision::Stop(CallError::AllAccountsExhausted)
        } else {
            RotationDecision::Retry { account }
        }
    }

    /// Rotation itself failed.
    pub fn on_rotation_failed(&self) -> CallError {
        CallError::AllAccountsExhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotates_until_every_account_tried() {
        let mut state = RetryState::new(5, 3);
        state.begin_attempt(1);
        assert_eq!(state.on_quota_exhausted(), QuotaDecision::Rotate);
        assert_eq!(state.on_rotated(true, 2), RotationDecision::Retry { account: 2 });
        state.begin_attempt(2);
        assert_eq!(state.on_quota_exhausted(), QuotaDecision::Rotate);
        state.begin_attempt(3);
        assert_eq!(
            state.on_quota_exhausted(),
            QuotaDecision::Stop(CallError::AllAccountsExhausted)
        );
        assert_eq!(state.tried(), &[1, 2, 3]);
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn test_single_account_stops_after_first_attempt() {
        let mut state = RetryState::new(3, 1);
        state.begin_attempt(1);
        assert_eq!(
            state.on_quota_exhausted(),
            QuotaDecision::Stop(CallError::AllAccountsExhausted)
        );
    }

    #[test]
    fn test_max_retries_bounds_attempts() {
        let mut state = RetryState::new(1, 10);
        state.begin_attempt(1);
        assert_eq!(state.on_quota_exhausted(), QuotaDecision::Rotate);
        state.begin_attempt(2);
        assert_eq!(
            state.on_quota_exhausted(),
            QuotaDecision::Stop(CallError::RetryLimitReached)
        );
    }

    #[test]
    fn test_zero_retries_never_rotates() {
        let mut state = RetryState::new(0, 4);
        state.begin_attempt(1);
        assert_eq!(
            state.on_quota_exhausted(),
            QuotaDecision::Stop(CallError::RetryLimitReached)
        );
    }

    #[test]
    fn test_never_revisits_tried_account() {
        let mut state = RetryState::new(5, 3);
        state.begin_attempt(1);
        // Another process rotated concurrently and we wrapped back to 1.
        assert_eq!(
            state.on_rotated(true, 1),
            RotationDecision::Stop(CallError::AllAccountsExhausted)
        );
        assert_eq!(
            state.on_rotated(false, 2),
            RotationDecision::Stop(CallError::AllAccountsExhausted)
        );
    }
}
