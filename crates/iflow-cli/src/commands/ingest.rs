//! `iflow-kg ingest`: archive -> graphs -> store.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use iflow_core::graph::GraphSummary;
use iflow_core::{build_graphs, ExportDocument, IsolationGranularity, KnowledgeGraph};
use iflow_graph::{GraphStore, GraphSynchronizer, MemoryGraphStore, SyncResult};

use crate::archive;
use crate::config::AppConfig;
use crate::output;

const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Args)]
pub struct IngestArgs {
    /// Zip archives or extracted directories
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Isolation granularity: upload (one key per archive) or folder (one per top-level directory)
    #[arg(long)]
    pub isolation: Option<String>,

    /// Override the derived folder display name
    #[arg(long)]
    pub name: Option<String>,

    /// Assemble and synchronize against an in-memory store only
    #[arg(long)]
    pub dry_run: bool,

    /// Also write the assembled graphs as JSON to this file
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Retries per folder when the store is unavailable
    #[arg(long, default_value = "2")]
    pub retries: u32,

    /// Print a JSON report instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct FolderReport<'a> {
    isolation_key: &'a str,
    name: &'a str,
    source_archive: &'a str,
    summary: GraphSummary,
    stats: &'a iflow_core::graph::AssemblyStats,
    sync: &'a SyncResult,
}

pub async fn execute(args: IngestArgs, config: &AppConfig) -> Result<()> {
    let granularity = args
        .isolation
        .as_deref()
        .map(IsolationGranularity::from_str)
        .unwrap_or_else(|| config.granularity());

    let mut graphs = Vec::new();
    for path in &args.paths {
        let mut upload = archive::read_upload(path, config.upload.max_bytes)?;
        if let Some(name) = &args.name {
            upload = upload.with_name(name.clone());
        }
        graphs.extend(build_graphs(&upload, granularity));
    }

    if let Some(out) = &args.export {
        let json = ExportDocument::from_graphs(&graphs).to_json()?;
        std::fs::write(out, json)
            .with_context(|| format!("Failed to write export to {}", out.display()))?;
        info!(path = %out.display(), "Wrote assembled graphs");
    }

    let results = if args.dry_run {
        let sync = GraphSynchronizer::new(MemoryGraphStore::new());
        synchronize_all(&sync, &graphs, args.retries).await?
    } else {
        let sync = super::connect(config).await?;
        synchronize_all(&sync, &graphs, args.retries).await?
    };

    if args.json {
        let report: Vec<FolderReport> = graphs
            .iter()
            .zip(&results)
            .map(|(graph, sync)| FolderReport {
                isolation_key: graph.isolation_key().as_str(),
                name: &graph.folder.name,
                source_archive: &graph.folder.source_archive,
                summary: graph.summary(),
                stats: &graph.stats,
                sync,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (graph, result) in graphs.iter().zip(&results) {
        output::print_graph(graph);
        output::print_sync_result(result);
        println!();
    }
    let verb = if args.dry_run { "Assembled (dry run)" } else { "Ingested" };
    println!(
        "{} {} folder(s) from {} archive(s).",
        verb.green().bold(),
        graphs.len(),
        args.paths.len()
    );
    Ok(())
}

/// Synchronize every graph, retrying the same assembled graph on store outages.
async fn synchronize_all<S: GraphStore>(
    sync: &GraphSynchronizer<S>,
    graphs: &[KnowledgeGraph],
    retries: u32,
) -> Result<Vec<SyncResult>> {
    let mut results = Vec::with_capacity(graphs.len());
    for graph in graphs {
        let key = graph.isolation_key();
        let mut attempt = 0;
        let result = loop {
            match sync.synchronize(graph).await {
                Ok(result) => break result,
                Err(e) if e.is_retryable() && attempt < retries => {
                    attempt += 1;
                    warn!(isolation_key = %key, attempt, error = %e, "Store unavailable, retrying");
                    tokio::time::sleep(RETRY_DELAY * attempt).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Synchronizing folder {key} failed after {} attempt(s)", attempt + 1)
                    })
                }
            }
        };
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iflow_core::pipeline::Upload;
    use iflow_core::SourceFile;

    const DOC: &str = r#"<bpmn2:definitions xmlns:bpmn2="http://www.omg.org/spec/BPMN/20100524/MODEL">
  <bpmn2:process id="P1"><bpmn2:startEvent id="S"/><bpmn2:endEvent id="E"/>
    <bpmn2:sequenceFlow id="F" sourceRef="S" targetRef="E"/></bpmn2:process>
</bpmn2:definitions>"#;

    fn graphs() -> Vec<KnowledgeGraph> {
        let upload = Upload::new("a.zip", vec![SourceFile::new("Flow_A/a.iflw", DOC)]);
        build_graphs(&upload, IsolationGranularity::PerUpload)
    }

    #[tokio::test]
    async fn test_synchronize_all_counts() {
        let sync = GraphSynchronizer::new(MemoryGraphStore::new());
        let graphs = graphs();
        let results = synchronize_all(&sync, &graphs, 0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].nodes_created, graphs[0].node_count());
        assert_eq!(results[0].relationships_created, 1);
    }

    #[tokio::test]
    async fn test_outage_without_retries_is_reported() {
        let store = MemoryGraphStore::new();
        store.set_available(false);
        let sync = GraphSynchronizer::new(store);
        let err = synchronize_all(&sync, &graphs(), 0).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed after 1 attempt"));
    }
}
