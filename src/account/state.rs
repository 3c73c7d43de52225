//! Persisted rotation state (`state.yaml`).

use crate::error::{Result, RotationError};
use crate::paths::{parse_slot_id, StorePaths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;

use super::store::atomic_write;

/// Metadata tracked per account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountMeta {
    #[serde(default)]
    pub switches_count: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    /// Whether the last attempt on this account hit its quota.
    #[serde(default)]
    pub exhausted: bool,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Rotation state for one Account Store.
///
/// Invariants: `known_ids` has no duplicates and `active_id`, when set, is
/// one of them. [`RotationState::load`] rejects files that break either.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationState {
    #[serde(default)]
    pub active_id: Option<u32>,
    /// Registered ids in insertion order.
    #[serde(default)]
    pub known_ids: Vec<u32>,
    #[serde(default)]
    pub rotation_count: u64,
    #[serde(default)]
    pub last_switch: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accounts: BTreeMap<u32, AccountMeta>,
}

impl RotationState {
    /// Reads the state file, or bootstraps from slot files when it is absent.
    pub fn load(paths: &StorePaths) -> Result<Self> {
        let content = match std::fs::read_to_string(&paths.state_file) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Self::discover(paths),
            Err(e) => return Err(RotationError::storage("Failed to read state file", e)),
        };

        if content.trim().is_empty() {
            return Self::discover(paths);
        }

        let state: Self = serde_yaml::from_str(&content)
            .map_err(|e| RotationError::storage("Failed to parse state file", e))?;
        state.validate()?;
        Ok(state)
    }

    /// Writes the state file atomically.
    pub fn save(&self, paths: &StorePaths) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| RotationError::storage("Failed to serialize state", e))?;
        atomic_write(&paths.state_file, content.as_bytes())
            .map_err(|e| RotationError::storage("Failed to write state file", e))
    }

    /// Builds a fresh state from the slot files already in `accounts/`.
    fn discover(paths: &StorePaths) -> Result<Self> {
        let entries = match std::fs::read_dir(&paths.accounts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(RotationError::storage("Failed to read accounts directory", e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| RotationError::storage("Failed to read accounts directory", e))?;
            if let Some(id) = parse_slot_id(&entry.path()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        ids.dedup();

        if !ids.is_empty() {
            tracing::debug!("Discovered {} existing account slot(s)", ids.len());
        }

        Ok(Self {
            known_ids: ids,
            ..Self::default()
        })
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for id in &self.known_ids {
            if !seen.insert(*id) {
                return Err(RotationError::Storage(format!(
                    "state file lists account {} more than once",
                    id
                )));
            }
        }
        if let Some(active) = self.active_id {
            if !seen.contains(&active) {
                return Err(RotationError::Storage(format!(
                    "active account {} is not a registered account",
                    active
                )));
            }
        }
        Ok(())
    }

    pub fn is_known(&self, id: u32) -> bool {
        self.known_ids.contains(&id)
    }

    /// Known ids in ascending order.
    pub fn sorted_ids(&self) -> Vec<u32> {
        let mut ids = self.known_ids.clone();
        ids.sort_unstable();
        ids
    }

    /// The id after the active one in ascending order, wrapping around.
    ///
    /// Falls back to the lowest id when nothing is active.
    pub fn next_id(&self) -> Option<u32> {
        let ids = self.sorted_ids();
        let first = *ids.first()?;
        let next = match self.active_id {
            Some(active) => ids.iter().copied().find(|id| *id > active).unwrap_or(first),
            None => first,
        };
        Some(next)
    }

    /// One past the highest registered id, or 1 when empty.
    pub fn next_free_id(&self) -> Result<u32> {
        match self.known_ids.iter().max() {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or_else(|| {
                RotationError::Storage(format!("no account id left after {}", max))
            }),
        }
    }

    pub fn meta_mut(&mut self, id: u32) -> &mut AccountMeta {
        self.accounts.entry(id).or_default()
    }

    /// Records a completed switch to `id`.
    pub fn record_switch(&mut self, id: u32, at: DateTime<Utc>) {
        self.active_id = Some(id);
        self.rotation_count += 1;
        self.last_switch = Some(at);
        let meta = self.meta_mut(id);
        meta.switches_count += 1;
        meta.last_used = Some(at);
    }
}
