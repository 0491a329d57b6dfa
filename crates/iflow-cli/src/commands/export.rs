//! `iflow-kg export`: JSON from the store or straight from an archive.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use iflow_core::{build_graphs, ExportDocument, IsolationGranularity, IsolationKey};

use crate::archive;
use crate::config::AppConfig;

#[derive(Args)]
pub struct ExportArgs {
    /// Export only this folder from the store
    #[arg(long, conflicts_with = "from")]
    pub key: Option<String>,

    /// Assemble this archive in memory instead of reading the store
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Isolation granularity for `--from`
    #[arg(long, requires = "from")]
    pub isolation: Option<String>,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn execute(args: ExportArgs, config: &AppConfig) -> Result<()> {
    let document = match &args.from {
        Some(path) => {
            let granularity = args
                .isolation
                .as_deref()
                .map(IsolationGranularity::from_str)
                .unwrap_or_else(|| config.granularity());
            let upload = archive::read_upload(path, config.upload.max_bytes)?;
            ExportDocument::from_graphs(&build_graphs(&upload, granularity))
        }
        None => {
            let sync = super::connect(config).await?;
            let scope = args.key.map(IsolationKey::new);
            let document = sync.export(scope.as_ref()).await?;
            if document.is_empty() {
                if let Some(key) = scope {
                    bail!("No folder with isolation key {key}");
                }
            }
            document
        }
    };

    let json = document.to_json()?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(
                path = %path.display(),
                nodes = document.nodes.len(),
                edges = document.edges.len(),
                "Export written"
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}
