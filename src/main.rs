mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use credential_rotation::account::{AccountManager, SwitchReason};
use credential_rotation::config::RotationConfig;
use credential_rotation::paths::{default_base_dir, StorePaths};
use credential_rotation::setup::{add_from_file, run_setup};
use credential_rotation::wrapper::InvocationWrapper;
use std::process::ExitCode;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let base_dir = match &cli.base_dir {
        Some(dir) => dir.clone(),
        None => default_base_dir()?,
    };
    let paths = StorePaths::new(base_dir);
    let config = match &cli.config {
        Some(path) => RotationConfig::load(path)?,
        None => RotationConfig::load_or_default(&paths.config_file)?,
    };
    let manager = AccountManager::open(paths)
        .context("Failed to open account store")?
        .with_lock_timeout(config.lock_timeout());

    if cli.list {
        list(&manager)
    } else if let Some(id) = cli.switch {
        manager.switch_to(id, SwitchReason::Manual)?;
        println!("Switched to account {}", id);
        Ok(())
    } else if cli.switch_next {
        let (switched, id) = manager.switch_next(SwitchReason::Manual)?;
        if switched {
            println!("Switched to account {}", id);
        } else {
            println!("Account {} is the only account; still active", id);
        }
        Ok(())
    } else if cli.add {
        let source = cli.from.unwrap_or_else(|| manager.paths().active_file.clone());
        let id = add_from_file(&manager, &source)?;
        println!("Registered account {}", id);
        Ok(())
    } else if let Some(id) = cli.remove {
        manager.remove_account(id)?;
        println!("Removed account {}", id);
        Ok(())
    } else if cli.stats {
        stats(&manager)
    } else if cli.setup {
        let added = run_setup(
            &manager,
            cli.count,
            std::io::stdin().lock(),
            std::io::stdout(),
        )?;
        println!("Setup complete: {} account(s) registered", added.len());
        Ok(())
    } else if let Some(prompt) = cli.run {
        let wrapper = InvocationWrapper::from_config(manager, &config.wrapper)?;
        if cli.fallback {
            let output = wrapper
                .call_with_fallback(&prompt, &config.wrapper.fallback_message, None)
                .await;
            println!("{}", output);
            return Ok(());
        }
        let result = wrapper.call(&prompt, None).await;
        if result.success {
            println!("{}", result.output);
            Ok(())
        } else {
            let error = result
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "call failed".to_string());
            anyhow::bail!(
                "{} after {} attempt(s) on accounts {:?}",
                error,
                result.attempts,
                result.accounts_tried
            )
        }
    } else if let Some(prompt) = cli.probe {
        let wrapper = InvocationWrapper::from_config(manager, &config.wrapper)?;
        let reports = wrapper.probe_accounts(&prompt, None).await?;
        println!("{}", serde_json::to_string_pretty(&reports)?);
        Ok(())
    } else {
        anyhow::bail!("No action given")
    }
}

fn list(manager: &AccountManager) -> Result<()> {
    let accounts = manager.list_accounts()?;
    if accounts.is_empty() {
        println!("No accounts registered. Run with --setup or --add.");
        return Ok(());
    }
    for account in accounts {
        let marker = if account.active { "*" } else { " " };
        let last_used = account
            .last_used
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        let status = if account.exhausted { "exhausted" } else { "ok" };
        println!(
            "{} {:>3}  {:<9}  switches: {:<4}  last used: {}",
            marker, account.id, status, account.switches_count, last_used
        );
        if let Some(error) = &account.last_error {
            println!("        last error: {}", error);
        }
    }
    Ok(())
}

fn stats(manager: &AccountManager) -> Result<()> {
    let stats = manager.get_stats()?;
    println!("Accounts:        {}", stats.total_accounts);
    println!(
        "Active:          {}",
        stats
            .active_id
            .map_or_else(|| "none".to_string(), |id| id.to_string())
    );
    println!("Rotations:       {}", stats.rotation_count);
    println!(
        "Last switch:     {}",
        stats
            .last_switch
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    );
    if let Some((id, count)) = stats.most_used {
        println!("Most used:       account {} ({} switches)", id, count);
    }
    Ok(())
}
