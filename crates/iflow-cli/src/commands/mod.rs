//! CLI command definitions and handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use iflow_graph::{GraphSynchronizer, Neo4jGraphStore};

use crate::config::AppConfig;

pub mod clear;
pub mod export;
pub mod ingest;
pub mod schema;
pub mod status;

/// iFlow Knowledge Graph - SAP Integration Flows to Neo4j
#[derive(Parser)]
#[command(name = "iflow-kg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ./iflow-kg.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build knowledge graphs from iFlow archives and store them
    Ingest(ingest::IngestArgs),

    /// Show graph statistics, optionally for one folder
    Status(status::StatusArgs),

    /// Delete one folder's graph, or the whole store
    Clear(clear::ClearArgs),

    /// Export a graph as JSON
    Export(export::ExportArgs),

    /// Create Neo4j constraints and indexes
    Schema,
}

impl Cli {
    /// Machine-readable output requested; keeps stdout free of log lines.
    pub fn wants_json(&self) -> bool {
        match &self.command {
            Commands::Ingest(args) => args.json,
            Commands::Status(args) => args.json,
            Commands::Export(args) => args.output.is_none(),
            Commands::Clear(_) | Commands::Schema => false,
        }
    }

    pub async fn execute(self) -> Result<()> {
        let config = AppConfig::load(self.config.as_deref())?;

        match self.command {
            Commands::Ingest(args) => ingest::execute(args, &config).await,
            Commands::Status(args) => status::execute(args, &config).await,
            Commands::Clear(args) => clear::execute(args, &config).await,
            Commands::Export(args) => export::execute(args, &config).await,
            Commands::Schema => schema::execute(&config).await,
        }
    }
}

/// Connect to Neo4j and wrap the store; the configured timeout bounds the connect too.
pub(crate) async fn connect(config: &AppConfig) -> Result<GraphSynchronizer<Neo4jGraphStore>> {
    let store = Neo4jGraphStore::connect(&config.neo4j, config.store_timeout())
        .await
        .with_context(|| format!("Cannot reach Neo4j at {}", config.neo4j.uri))?;
    Ok(GraphSynchronizer::new(store).with_timeout(config.store_timeout()))
}
