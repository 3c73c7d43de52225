//! Interactive registration of accounts logged in through the wrapped tool.

use crate::account::AccountManager;
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;

/// Registers the credentials in `source` as a new account.
///
/// When `source` is the active credential file the new account also becomes
/// the active one, since that file now holds its login.
pub fn add_from_file(manager: &AccountManager, source: &Path) -> Result<u32> {
    if is_same_file(source, &manager.paths().active_file) {
        return Ok(manager.add_active_account()?);
    }
    let credentials = std::fs::read(source)
        .with_context(|| format!("Failed to read credentials from {}", source.display()))?;
    let id = manager.add_account(&credentials)?;
    Ok(id)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Walks the user through logging in `count` times, registering the active
/// credential file after each ENTER.
///
/// Stops early if `input` reaches end of file. Returns the new ids in order;
/// the last one registered is left active.
pub fn run_setup<R: BufRead, W: Write>(
    manager: &AccountManager,
    count: u32,
    mut input: R,
    mut output: W,
) -> Result<Vec<u32>> {
    let active_file = manager.paths().active_file.clone();
    let mut added = Vec::new();

    for n in 1..=count {
        writeln!(
            output,
            "[{}/{}] Log in with the wrapped tool, then press ENTER to register {}",
            n,
            count,
            active_file.display()
        )?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output, "Input closed; stopping setup.")?;
            break;
        }

        if !active_file.exists() {
            writeln!(
                output,
                "No credentials found at {}; skipping.",
                active_file.display()
            )?;
            continue;
        }
        let id = manager.add_active_account()?;
        writeln!(output, "Registered account {}", id)?;
        added.push(id);
    }

    if let Some(id) = added.last() {
        writeln!(output, "Active account: {}", id)?;
    }
    Ok(added)
}
