//! `iflow-kg schema`: constraints and indexes.

use anyhow::Result;
use colored::Colorize;

use iflow_graph::schema::initialize_schema;

use crate::config::AppConfig;

pub async fn execute(config: &AppConfig) -> Result<()> {
    let sync = super::connect(config).await?;
    let applied = initialize_schema(sync.store().client()).await?;
    println!(
        "{} {} schema statement(s) applied to {}",
        "✓".green(),
        applied,
        config.neo4j.database.cyan()
    );
    Ok(())
}
