//! Constraints and indexes backing the `(isolation_key, id)` upsert lookups.

use neo4rs::Query;
use tracing::info;

use crate::client::GraphClient;
use crate::error::StoreResult;

const SCHEMA_STATEMENTS: &[&str] = &[
    // One Folder per isolation key
    "CREATE CONSTRAINT folder_isolation_key IF NOT EXISTS FOR (f:Folder) REQUIRE f.isolation_key IS UNIQUE",
    // Upsert lookups are always (isolation_key, id)
    "CREATE INDEX document_scope IF NOT EXISTS FOR (n:IFlowDocument) ON (n.isolation_key, n.id)",
    "CREATE INDEX element_scope IF NOT EXISTS FOR (n:ProcessElement) ON (n.isolation_key, n.id)",
    "CREATE INDEX participant_scope IF NOT EXISTS FOR (n:Participant) ON (n.isolation_key, n.id)",
    "CREATE INDEX protocol_scope IF NOT EXISTS FOR (n:Protocol) ON (n.isolation_key, n.id)",
    // Protocol lookups by name across folders
    "CREATE INDEX protocol_name IF NOT EXISTS FOR (n:Protocol) ON (n.name)",
];

/// Apply every schema statement. Idempotent; returns how many ran.
pub async fn initialize_schema(client: &GraphClient) -> StoreResult<usize> {
    info!(statements = SCHEMA_STATEMENTS.len(), "Applying graph schema");

    for statement in SCHEMA_STATEMENTS {
        client.execute(Query::new(statement.to_string())).await?;
    }

    info!("Graph schema ready");
    Ok(SCHEMA_STATEMENTS.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        assert!(SCHEMA_STATEMENTS.iter().all(|s| s.contains("IF NOT EXISTS")));
    }
}
