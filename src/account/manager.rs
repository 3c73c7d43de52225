//! Account Manager: the only writer of the Account Store and rotation state.
//!
//! Every mutating operation runs under one exclusive [`StoreLock`] covering
//! the whole sync-back, swap and persist sequence, and re-reads state from
//! disk after acquiring it. Nothing is cached between calls, so any number
//! of managers (in this process or others) can share a base directory.

use super::audit::{AuditEntry, AuditEvent, AuditLog, SwitchReason};
use super::lock::{LockMode, StoreLock};
use super::state::RotationState;
use super::store::{atomic_copy, atomic_write, is_symlink, read_optional, remove_if_exists};
use crate::error::{Result, RotationError};
use crate::paths::StorePaths;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on waiting for the rotation lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-only view of one registered account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub id: u32,
    pub active: bool,
    pub last_used: Option<DateTime<Utc>>,
    pub exhausted: bool,
    pub last_error: Option<String>,
    pub switches_count: u64,
    pub slot_path: PathBuf,
}

/// Aggregate statistics derived from rotation state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotationStats {
    pub total_accounts: usize,
    pub rotation_count: u64,
    pub last_switch: Option<DateTime<Utc>>,
    pub active_id: Option<u32>,
    /// Account with the most switches and its count, if any switch happened.
    pub most_used: Option<(u32, u64)>,
    pub accounts: Vec<AccountSummary>,
}

/// Result of using an account, as observed by the wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountHealth {
    /// The account served a request; clears the exhausted flag.
    Healthy,
    /// The account hit its quota.
    Exhausted { error: String },
    /// The account failed for a reason unrelated to quota.
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct AccountManager {
    paths: StorePaths,
    audit: AuditLog,
    lock_timeout: Duration,
}

impl AccountManager {
    pub fn new(paths: StorePaths) -> Self {
        Self {
            audit: AuditLog::new(paths.audit_log.clone()),
            paths,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Creates the store directories and checks that existing state is readable.
    pub fn open(paths: StorePaths) -> Result<Self> {
        std::fs::create_dir_all(&paths.accounts_dir)
            .map_err(|e| RotationError::storage("Failed to create accounts directory", e))?;
        let manager = Self::new(paths);
        {
            let _lock = manager.lock(LockMode::Shared)?;
            RotationState::load(&manager.paths)?;
        }
        Ok(manager)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    fn lock(&self, mode: LockMode) -> Result<StoreLock> {
        StoreLock::acquire(&self.paths.lock_file, mode, self.lock_timeout)
    }

    fn summarize(&self, state: &RotationState) -> Vec<AccountSummary> {
        state
            .sorted_ids()
            .into_iter()
            .map(|id| {
                let meta = state.accounts.get(&id).cloned().unwrap_or_default();
                AccountSummary {
                    id,
                    active: state.active_id == Some(id),
                    last_used: meta.last_used,
                    exhausted: meta.exhausted,
                    last_error: meta.last_error,
                    switches_count: meta.switches_count,
                    slot_path: self.paths.slot_path(id),
                }
            })
            .collect()
    }

    /// Lists registered accounts in ascending id order.
    pub fn list_accounts(&self) -> Result<Vec<AccountSummary>> {
        let _lock = self.lock(LockMode::Shared)?;
        let state = RotationState::load(&self.paths)?;
        Ok(self.summarize(&state))
    }

    /// Returns the active account id, if any.
    pub fn active_account(&self) -> Result<Option<u32>> {
        let _lock = self.lock(LockMode::Shared)?;
        Ok(RotationState::load(&self.paths)?.active_id)
    }

    /// Registered ids in ascending order.
    pub fn known_ids(&self) -> Result<Vec<u32>> {
        let _lock = self.lock(LockMode::Shared)?;
        Ok(RotationState::load(&self.paths)?.sorted_ids())
    }

    /// Makes `id` the active account.
    pub fn switch_to(&self, id: u32, reason: SwitchReason) -> Result<()> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let state = RotationState::load(&self.paths)?;
        self.switch_locked(state, id, reason)
    }

    /// Advances to the next registered id in ascending order, wrapping.
    ///
    /// Returns whether a logical switch happened and the now-active id. With
    /// a single registered account that is already active this only syncs
    /// the active file back into its slot.
    pub fn switch_next(&self, reason: SwitchReason) -> Result<(bool, u32)> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let state = RotationState::load(&self.paths)?;
        let next = state.next_id().ok_or(RotationError::NoAccountsAvailable)?;

        if state.known_ids.len() == 1 && state.active_id == Some(next) {
            self.sync_back(state.active_id)?;
            tracing::debug!("Only account {} registered; nothing to rotate to", next);
            return Ok((false, next));
        }

        self.switch_locked(state, next, reason)?;
        Ok((true, next))
    }

    /// Returns the active id, activating the lowest registered id if none is.
    ///
    /// Also rewrites the active file from the active slot if something
    /// deleted it since the last switch.
    pub fn ensure_active(&self) -> Result<u32> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let state = RotationState::load(&self.paths)?;

        if let Some(active) = state.active_id {
            if !self.paths.active_file.exists() {
                tracing::warn!(
                    "Active credential file missing; restoring account {} from its slot",
                    active
                );
                atomic_copy(&self.paths.slot_path(active), &self.paths.active_file)
                    .map_err(|e| RotationError::swap("Failed to restore active credentials", e))?;
            }
            return Ok(active);
        }

        let first = state.next_id().ok_or(RotationError::NoAccountsAvailable)?;
        self.switch_locked(state, first, SwitchReason::Setup)?;
        Ok(first)
    }

    /// Registers a new account holding `credentials` and returns its id.
    ///
    /// Content is never inspected; adding the same blob twice yields two accounts.
    pub fn add_account(&self, credentials: &[u8]) -> Result<u32> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let mut state = RotationState::load(&self.paths)?;
        let id = state.next_free_id()?;
        let slot = self.paths.slot_path(id);

        atomic_write(&slot, credentials)
            .map_err(|e| RotationError::storage("Failed to write account slot", e))?;

        state.known_ids.push(id);
        state.meta_mut(id);
        if let Err(e) = state.save(&self.paths) {
            let _ = remove_if_exists(&slot);
            return Err(e);
        }

        self.append_audit(AuditEvent::Added, None, Some(id), SwitchReason::Setup, &state);
        tracing::info!("Registered account {}", id);
        Ok(id)
    }

    /// Registers the active credential file as a new account and makes it
    /// the active one.
    ///
    /// The active file holds a fresh login at this point, so it is never
    /// synced back into the previously active account's slot.
    pub fn add_active_account(&self) -> Result<u32> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let mut state = RotationState::load(&self.paths)?;

        let credentials = read_optional(&self.paths.active_file)
            .map_err(|e| RotationError::storage("Failed to read active credentials", e))?
            .ok_or_else(|| {
                RotationError::SwapFailed(format!(
                    "no active credential file at {}",
                    self.paths.active_file.display()
                ))
            })?;

        let id = state.next_free_id()?;
        let slot = self.paths.slot_path(id);
        atomic_write(&slot, &credentials)
            .map_err(|e| RotationError::storage("Failed to write account slot", e))?;

        let previous = state.active_id;
        state.known_ids.push(id);
        state.record_switch(id, Utc::now());
        if let Err(e) = state.save(&self.paths) {
            let _ = remove_if_exists(&slot);
            return Err(e);
        }

        self.append_audit(AuditEvent::Added, None, Some(id), SwitchReason::Setup, &state);
        self.append_audit(AuditEvent::Switch, previous, Some(id), SwitchReason::Setup, &state);
        tracing::info!("Registered active credentials as account {}", id);
        Ok(id)
    }

    /// Deregisters a non-active account and deletes its slot file.
    pub fn remove_account(&self, id: u32) -> Result<()> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let mut state = RotationState::load(&self.paths)?;

        if !state.is_known(id) {
            return Err(RotationError::AccountNotFound(id));
        }
        if state.active_id == Some(id) {
            return Err(RotationError::CannotRemoveActive(id));
        }

        state.known_ids.retain(|known| *known != id);
        state.accounts.remove(&id);
        state.save(&self.paths)?;

        if let Err(e) = remove_if_exists(&self.paths.slot_path(id)) {
            tracing::warn!("Account {} deregistered but slot file remains: {}", id, e);
        }

        self.append_audit(AuditEvent::Removed, Some(id), None, SwitchReason::Manual, &state);
        tracing::info!("Removed account {}", id);
        Ok(())
    }

    /// Records how an account behaved. Unknown ids are ignored.
    pub fn record_outcome(&self, id: u32, health: AccountHealth) -> Result<()> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let mut state = RotationState::load(&self.paths)?;
        if !state.is_known(id) {
            tracing::debug!("Ignoring outcome for unregistered account {}", id);
            return Ok(());
        }

        let meta = state.meta_mut(id);
        match health {
            AccountHealth::Healthy => {
                meta.exhausted = false;
                meta.last_error = None;
                meta.last_used = Some(Utc::now());
            }
            AccountHealth::Exhausted { error } => {
                meta.exhausted = true;
                meta.last_error = Some(error);
            }
            AccountHealth::Failed { error } => {
                meta.last_error = Some(error);
            }
        }
        state.save(&self.paths)
    }

    pub fn get_stats(&self) -> Result<RotationStats> {
        let _lock = self.lock(LockMode::Shared)?;
        let state = RotationState::load(&self.paths)?;
        let accounts = self.summarize(&state);

        // Ties resolve to the lowest id.
        let most_used = accounts
            .iter()
            .filter(|a| a.switches_count > 0)
            .max_by(|a, b| {
                a.switches_count
                    .cmp(&b.switches_count)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|a| (a.id, a.switches_count));

        Ok(RotationStats {
            total_accounts: accounts.len(),
            rotation_count: state.rotation_count,
            last_switch: state.last_switch,
            active_id: state.active_id,
            most_used,
            accounts,
        })
    }

    pub fn audit_entries(&self) -> Result<Vec<AuditEntry>> {
        self.audit.entries()
    }

    /// Sync-back, swap, persist, audit. Caller holds the exclusive lock.
    fn switch_locked(&self, state: RotationState, target: u32, reason: SwitchReason) -> Result<()> {
        if !state.is_known(target) {
            return Err(RotationError::AccountNotFound(target));
        }

        let target_slot = self.paths.slot_path(target);
        if !target_slot.exists() {
            return Err(RotationError::SwapFailed(format!(
                "slot file for account {} is missing: {}",
                target,
                target_slot.display()
            )));
        }

        let previous = state.active_id;
        let previous_bytes = self.sync_back(previous)?;

        atomic_copy(&target_slot, &self.paths.active_file)
            .map_err(|e| RotationError::swap("Failed to activate credentials", e))?;
        tracing::debug!("Activated account {}", target);

        let mut next = state;
        next.record_switch(target, Utc::now());
        if let Err(e) = next.save(&self.paths) {
            self.restore_active(previous_bytes);
            return Err(e);
        }

        self.append_audit(AuditEvent::Switch, previous, Some(target), reason, &next);
        tracing::info!(
            "Switched account {} -> {} ({})",
            previous.map_or_else(|| "none".to_string(), |p| p.to_string()),
            target,
            reason
        );
        Ok(())
    }

    /// Copies the active file back into the active account's slot.
    ///
    /// Returns the active file's bytes as they were, for rollback. A legacy
    /// symlink at the active path is removed instead of followed.
    fn sync_back(&self, active: Option<u32>) -> Result<Option<Vec<u8>>> {
        let active_file = &self.paths.active_file;
        if is_symlink(active_file) {
            tracing::debug!("Removing legacy symlinked active credential file");
            remove_if_exists(active_file)
                .map_err(|e| RotationError::swap("Failed to remove legacy symlink", e))?;
            return Ok(None);
        }

        let bytes = read_optional(active_file)
            .map_err(|e| RotationError::swap("Failed to read active credentials", e))?;

        if let (Some(id), Some(content)) = (active, bytes.as_ref()) {
            atomic_write(&self.paths.slot_path(id), content)
                .map_err(|e| RotationError::swap("Failed to sync back credentials", e))?;
            tracing::debug!("Synced credentials back to account {}", id);
        }
        Ok(bytes)
    }

    fn restore_active(&self, previous: Option<Vec<u8>>) {
        let result = match previous {
            Some(bytes) => atomic_write(&self.paths.active_file, &bytes),
            None => remove_if_exists(&self.paths.active_file),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to roll back active credential file: {}", e);
        }
    }

    fn append_audit(
        &self,
        event: AuditEvent,
        from: Option<u32>,
        to: Option<u32>,
        reason: SwitchReason,
        state: &RotationState,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            from,
            to,
            reason,
            rotation_count: state.rotation_count,
        };
        if let Err(e) = self.audit.append(&entry) {
            tracing::warn!(
                "Failed to append to audit log {}: {}",
                self.audit.path().display(),
                e
            );
        }
    }
}

#[cfg(test)]
#[path = "tests/manager_tests.rs"]
mod tests;
