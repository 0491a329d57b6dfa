//! `iflow-kg clear`: scoped or full deletion.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use iflow_core::IsolationKey;

use crate::config::AppConfig;

#[derive(Args)]
pub struct ClearArgs {
    /// Isolation key of the folder to delete
    #[arg(long, conflicts_with = "all")]
    pub key: Option<String>,

    /// Delete every node in the store (irreversible)
    #[arg(long)]
    pub all: bool,

    /// Confirm `--all`
    #[arg(long)]
    pub yes: bool,
}

/// Resolve the scope to clear. `Ok(None)` means the whole store.
fn scope(args: &ClearArgs) -> Result<Option<IsolationKey>> {
    match (&args.key, args.all) {
        (Some(key), _) if key.trim().is_empty() => bail!("--key must not be empty"),
        (Some(key), _) => Ok(Some(IsolationKey::new(key.trim()))),
        (None, true) if args.yes => Ok(None),
        (None, true) => bail!("Refusing to clear the entire store without --yes"),
        (None, false) => bail!("Specify --key <ISOLATION_KEY> or --all"),
    }
}

pub async fn execute(args: ClearArgs, config: &AppConfig) -> Result<()> {
    let scope = scope(&args)?;
    let sync = super::connect(config).await?;
    let deleted = sync.clear(scope.as_ref()).await?;

    match scope {
        Some(key) => println!(
            "{} {} node(s) from folder {}",
            "Deleted".green().bold(),
            deleted,
            key.as_str().cyan()
        ),
        None => println!(
            "{} {} node(s); the store is empty",
            "Deleted".red().bold(),
            deleted
        ),
    }
    Ok(())
}
