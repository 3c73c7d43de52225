//! On-disk layout of an Account Store.
//!
//! Everything lives under one base directory (`~/.qwen` by default):
//! - `accounts/oauth_creds_<id>.json` - one slot per registered account
//! - `oauth_creds.json` - the active credential file read by the wrapped tool
//! - `state.yaml` - rotation state
//! - `rotation.log` - audit log, one JSON object per line
//! - `config.yaml` - optional rotation config
//! - `.rotation.lock` - advisory lock file

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default base directory name under the user's home.
const DEFAULT_DIR_NAME: &str = ".qwen";

/// Environment variable overriding the base directory.
pub const BASE_DIR_ENV: &str = "CRED_ROTATION_DIR";

const ACCOUNTS_DIR_NAME: &str = "accounts";
const ACTIVE_FILE_NAME: &str = "oauth_creds.json";
const STATE_FILE_NAME: &str = "state.yaml";
const AUDIT_LOG_NAME: &str = "rotation.log";
const CONFIG_FILE_NAME: &str = "config.yaml";
const LOCK_FILE_NAME: &str = ".rotation.lock";

const SLOT_PREFIX: &str = "oauth_creds_";
const SLOT_SUFFIX: &str = ".json";

/// Resolves the default base directory: `$CRED_ROTATION_DIR`, else `~/.qwen`.
pub fn default_base_dir() -> Result<PathBuf> {
    std::env::var(BASE_DIR_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(DEFAULT_DIR_NAME)))
        .context("Cannot determine credential rotation directory")
}

/// Paths of every file in one Account Store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub base_dir: PathBuf,
    pub accounts_dir: PathBuf,
    pub active_file: PathBuf,
    pub state_file: PathBuf,
    pub audit_log: PathBuf,
    pub config_file: PathBuf,
    pub lock_file: PathBuf,
}

impl StorePaths {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            accounts_dir: base_dir.join(ACCOUNTS_DIR_NAME),
            active_file: base_dir.join(ACTIVE_FILE_NAME),
            state_file: base_dir.join(STATE_FILE_NAME),
            audit_log: base_dir.join(AUDIT_LOG_NAME),
            config_file: base_dir.join(CONFIG_FILE_NAME),
            lock_file: base_dir.join(LOCK_FILE_NAME),
            base_dir,
        }
    }

    /// Returns the slot file for an account: `accounts/oauth_creds_<id>.json`
    pub fn slot_path(&self, id: u32) -> PathBuf {
        self.accounts_dir
            .join(format!("{}{}{}", SLOT_PREFIX, id, SLOT_SUFFIX))
    }
}

/// Parses the account id out of a slot file name.
///
/// Returns `None` for anything that is not `oauth_creds_<id>.json`.
pub fn parse_slot_id(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(SLOT_PREFIX)?
        .strip_suffix(SLOT_SUFFIX)?
        .parse()
        .ok()
}
