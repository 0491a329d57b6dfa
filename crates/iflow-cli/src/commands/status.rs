//! `iflow-kg status`: store statistics.

use anyhow::Result;
use clap::Args;

use iflow_core::IsolationKey;

use crate::config::AppConfig;
use crate::output;

#[derive(Args)]
pub struct StatusArgs {
    /// Limit to one folder's isolation key
    #[arg(long)]
    pub key: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: StatusArgs, config: &AppConfig) -> Result<()> {
    let sync = super::connect(config).await?;
    let scope = args.key.map(IsolationKey::new);
    let stats = sync.stats(scope.as_ref()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    output::print_stats(&stats, scope.as_ref());
    if scope.is_none() {
        let folders = sync.folders().await?;
        println!();
        output::print_folders(&folders);
    }
    Ok(())
}
