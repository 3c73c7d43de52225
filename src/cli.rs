use clap::{ArgGroup, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "account-rotate")]
#[command(about = "Rotate OAuth credentials between accounts of a quota-limited CLI tool")]
#[command(version)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["list", "switch", "switch_next", "add", "remove", "stats", "setup", "run", "probe"]),
))]
pub struct Cli {
    /// List registered accounts
    #[arg(long)]
    pub list: bool,

    /// Make the given account active
    #[arg(long, value_name = "ID")]
    pub switch: Option<u32>,

    /// Rotate to the next account in ascending id order
    #[arg(long)]
    pub switch_next: bool,

    /// Register the active credential file (or --from) as a new account
    #[arg(long)]
    pub add: bool,

    /// Credential file to register (used with --add)
    #[arg(long, value_name = "FILE", requires = "add")]
    pub from: Option<PathBuf>,

    /// Deregister a non-active account
    #[arg(long, value_name = "ID")]
    pub remove: Option<u32>,

    /// Show rotation statistics
    #[arg(long)]
    pub stats: bool,

    /// Interactively register several accounts
    #[arg(long)]
    pub setup: bool,

    /// Number of accounts to register (used with --setup)
    #[arg(long, value_name = "N", default_value = "2", requires = "setup")]
    pub count: u32,

    /// Run the wrapped tool once with this prompt, rotating on quota errors
    #[arg(long, value_name = "PROMPT")]
    pub run: Option<String>,

    /// Print the configured fallback message instead of failing (used with --run)
    #[arg(long, requires = "run")]
    pub fallback: bool,

    /// Run the wrapped tool once against every account
    #[arg(long, value_name = "PROMPT", num_args = 0..=1, default_missing_value = "hello")]
    pub probe: Option<String>,

    /// Override the base directory (default: $CRED_ROTATION_DIR or ~/.qwen)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Config file (default: <base-dir>/config.yaml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}
