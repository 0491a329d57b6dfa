//! Neo4j-backed graph store.
//!
//! Every node and relationship carries `isolation_key`. Nodes merge on
//! `(label, isolation_key, id)`, flow relationships on
//! `(isolation_key, source, target, kind)`. Each node and flow relationship
//! also stores its full JSON form in `payload` so fetches rebuild the exact
//! export shape; the flat properties are there for Cypher queries.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use neo4rs::Query;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use iflow_core::export::ExportDocument;
use iflow_core::graph::{FlowEdge, FolderNode, GraphNode};
use iflow_core::IsolationKey;

use super::{GraphStore, Link, StoreStats};
use crate::client::{GraphClient, GraphConfig};
use crate::error::{within, StoreError, StoreResult};

pub struct Neo4jGraphStore {
    client: GraphClient,
}

impl Neo4jGraphStore {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Connect and ping, giving up after `limit`.
    pub async fn connect(config: &GraphConfig, limit: Duration) -> StoreResult<Self> {
        let client = within(limit, "Neo4j connect", GraphClient::connect(config)).await?;
        info!(uri = %config.uri, database = %config.database, "Connected to Neo4j");
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    async fn payloads<T: DeserializeOwned>(&self, query: Query) -> StoreResult<Vec<T>> {
        let rows = self.client.query(query).await?;
        rows.into_iter()
            .map(|row| {
                let payload: String = row
                    .get("payload")
                    .map_err(|e| StoreError::decode(format!("missing payload: {e:?}")))?;
                serde_json::from_str(&payload).map_err(|e| StoreError::decode(e.to_string()))
            })
            .collect()
    }

    async fn counts(&self, query: Query, field: &str) -> StoreResult<BTreeMap<String, usize>> {
        let rows = self.client.query(query).await?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let name: String = row.get(field).unwrap_or_default();
            let count: i64 = row.get("count").unwrap_or(0);
            counts.insert(name, count.max(0) as usize);
        }
        Ok(counts)
    }
}

/// Append `AND <var>.isolation_key = $key` and bind the key when scoped.
fn scoped(cypher: &str, var: &str, scope: Option<&IsolationKey>, tail: &str) -> Query {
    match scope {
        Some(key) => Query::new(format!(
            "{cypher} AND {var}.isolation_key = $key {tail}"
        ))
        .param("key", key.as_str()),
        None => Query::new(format!("{cypher} {tail}")),
    }
}

fn to_payload<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::decode(e.to_string()))
}

/// MERGE for one node, with the label-specific flat properties.
fn node_query(node: &GraphNode, seq: usize) -> StoreResult<Query> {
    let extra = match node {
        GraphNode::Folder(_) => ", n.source_archive = $source_archive, n.created_at = $created_at",
        GraphNode::Document(_) => ", n.skipped_elements = $skipped_elements",
        GraphNode::ProcessElement(_) => {
            ", n.element_type = $element_type, n.document_id = $document_id, \
             n.parent_id = $parent_id, n.protocol = $protocol, \
             n.activity_type = $activity_type, n.event_definition = $event_definition"
        }
        GraphNode::Participant(_) => {
            ", n.role = $role, n.participant_type = $participant_type, n.protocol = $protocol"
        }
        GraphNode::Protocol(_) => "",
    };
    let cypher = format!(
        "MERGE (n:{label} {{isolation_key: $key, id: $id}})
         WITH n, n.payload IS NULL AS created
         SET n.name = $name, n.payload = $payload, n.seq = $seq{extra}
         RETURN created",
        label = node.label(),
    );

    let query = Query::new(cypher)
        .param("key", node.isolation_key().as_str())
        .param("id", node.id())
        .param("payload", to_payload(node)?)
        .param("seq", seq as i64);

    let query = match node {
        GraphNode::Folder(f) => query
            .param("name", f.name.as_str())
            .param("source_archive", f.source_archive.as_str())
            .param("created_at", f.created_at.to_rfc3339()),
        GraphNode::Document(d) => query
            .param("name", d.name.as_str())
            .param("skipped_elements", d.skipped_elements as i64),
        GraphNode::ProcessElement(e) => query
            .param("name", e.name.as_str())
            .param("element_type", e.element_type.as_str())
            .param("document_id", e.document_id.as_str())
            .param("parent_id", e.parent_id.as_deref().unwrap_or(""))
            .param("protocol", e.protocol.as_deref().unwrap_or(""))
            .param("activity_type", e.activity_type.as_deref().unwrap_or(""))
            .param("event_definition", e.event_definition.as_deref().unwrap_or("")),
        GraphNode::Participant(p) => query
            .param("name", p.name.as_str())
            .param("role", p.role.as_str())
            .param("participant_type", p.participant_type.as_deref().unwrap_or(""))
            .param("protocol", p.protocol.as_deref().unwrap_or("")),
        GraphNode::Protocol(p) => query.param("name", p.name.as_str()),
    };
    Ok(query)
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn upsert_node(&self, node: &GraphNode, seq: usize) -> StoreResult<bool> {
        let query = node_query(node, seq)?;
        let created: Option<bool> = self.client.query_scalar(query, "created").await?;
        debug!(label = node.label(), id = %node.id(), "Synced node");
        Ok(created.unwrap_or(false))
    }

    async fn upsert_link(&self, key: &IsolationKey, link: &Link) -> StoreResult<bool> {
        let query = Query::new(format!(
            "MATCH (a:{from} {{isolation_key: $key, id: $from_id}}),
                   (b:{to} {{isolation_key: $key, id: $to_id}})
             MERGE (a)-[r:{rel}]->(b)
             SET r.isolation_key = $key
             RETURN count(r) AS linked",
            from = link.from.label,
            to = link.to.label,
            rel = link.rel_type,
        ))
        .param("key", key.as_str())
        .param("from_id", link.from.id.as_str())
        .param("to_id", link.to.id.as_str());

        let linked: Option<i64> = self.client.query_scalar(query, "linked").await?;
        Ok(linked.unwrap_or(0) > 0)
    }

    async fn upsert_edge(&self, edge: &FlowEdge, seq: usize) -> StoreResult<bool> {
        let query = Query::new(format!(
            "MATCH (s:{source} {{isolation_key: $key, id: $source_id}}),
                   (t:{target} {{isolation_key: $key, id: $target_id}})
             MERGE (s)-[r:{rel} {{isolation_key: $key, kind: $kind}}]->(t)
             WITH r, r.payload IS NULL AS created
             SET r.id = $id,
                 r.name = $name,
                 r.protocol = $protocol,
                 r.payload = $payload,
                 r.seq = $seq
             RETURN created",
            source = edge.source_type.label(),
            target = edge.target_type.label(),
            rel = edge.kind.rel_type(),
        ))
        .param("key", edge.isolation_key.as_str())
        .param("source_id", edge.source.as_str())
        .param("target_id", edge.target.as_str())
        .param("kind", edge.kind.as_str())
        .param("id", edge.id.as_str())
        .param("name", edge.name.as_str())
        .param("protocol", edge.protocol.as_deref().unwrap_or(""))
        .param("payload", to_payload(edge)?)
        .param("seq", seq as i64);

        let created: Option<bool> = self.client.query_scalar(query, "created").await?;
        match created {
            Some(created) => {
                debug!(id = %edge.id, kind = edge.kind.as_str(), "Synced flow edge");
                Ok(created)
            }
            None => Err(StoreError::decode(format!(
                "edge '{}' has no endpoint nodes under '{}'",
                edge.id, edge.isolation_key
            ))),
        }
    }

    async fn delete_scope(&self, scope: Option<&IsolationKey>) -> StoreResult<usize> {
        let query = match scope {
            Some(key) => Query::new(
                "MATCH (n) WHERE n.isolation_key = $key
                 DETACH DELETE n
                 RETURN count(*) AS deleted"
                    .to_string(),
            )
            .param("key", key.as_str()),
            None => Query::new(
                "MATCH (n) DETACH DELETE n RETURN count(*) AS deleted".to_string(),
            ),
        };
        let deleted: Option<i64> = self.client.query_scalar(query, "deleted").await?;
        Ok(deleted.unwrap_or(0).max(0) as usize)
    }

    async fn stats(&self, scope: Option<&IsolationKey>) -> StoreResult<StoreStats> {
        let nodes = scoped(
            "MATCH (n) WHERE n.isolation_key IS NOT NULL",
            "n",
            scope,
            "RETURN labels(n)[0] AS label, count(n) AS count",
        );
        let rels = scoped(
            "MATCH ()-[r]->() WHERE r.isolation_key IS NOT NULL",
            "r",
            scope,
            "RETURN type(r) AS rel_type, count(r) AS count",
        );
        let nodes_by_label = self.counts(nodes, "label").await?;
        let relationships_by_type = self.counts(rels, "rel_type").await?;
        Ok(StoreStats::from_breakdown(nodes_by_label, relationships_by_type))
    }

    async fn fetch(&self, scope: Option<&IsolationKey>) -> StoreResult<ExportDocument> {
        let nodes = scoped(
            "MATCH (n) WHERE n.payload IS NOT NULL",
            "n",
            scope,
            "RETURN n.payload AS payload ORDER BY n.isolation_key, n.seq",
        );
        let edges = scoped(
            "MATCH ()-[r]->() WHERE r.payload IS NOT NULL",
            "r",
            scope,
            "RETURN r.payload AS payload ORDER BY r.isolation_key, r.seq",
        );
        Ok(ExportDocument {
            nodes: self.payloads(nodes).await?,
            edges: self.payloads(edges).await?,
        })
    }

    async fn folders(&self) -> StoreResult<Vec<FolderNode>> {
        let query = Query::new(
            "MATCH (f:Folder) RETURN f.payload AS payload ORDER BY f.created_at, f.id".to_string(),
        );
        let nodes: Vec<GraphNode> = self.payloads(query).await?;
        Ok(nodes
            .into_iter()
            .filter_map(|n| match n {
                GraphNode::Folder(f) => Some(f),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use iflow_core::graph::ProtocolNode;

    #[test]
    fn test_scoped_query_text() {
        let key = IsolationKey::new("Folder_A");
        let scoped_q = scoped("MATCH (n) WHERE n.x IS NOT NULL", "n", Some(&key), "RETURN n");
        assert!(scoped_q.has_param_key("key"));
        let unscoped = scoped("MATCH (n) WHERE n.x IS NOT NULL", "n", None, "RETURN n");
        assert!(!unscoped.has_param_key("key"));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_host_is_bounded() {
        let config = GraphConfig {
            uri: "bolt://10.255.255.1:7687".to_string(),
            ..GraphConfig::default()
        };
        let started = std::time::Instant::now();
        let err = Neo4jGraphStore::connect(&config, Duration::from_millis(200))
            .await
            .err()
            .unwrap();
        assert!(err.is_retryable());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_node_query_binds_identity() {
        let folder = GraphNode::Folder(FolderNode::new(
            IsolationKey::new("Folder_A"),
            "Orders",
            "orders.zip",
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        ));
        let q = node_query(&folder, 0).unwrap();
        assert!(q.has_param_key("key"));
        assert!(q.has_param_key("created_at"));

        let protocol = GraphNode::Protocol(ProtocolNode {
            id: "SOAP".to_string(),
            name: "SOAP".to_string(),
            isolation_key: IsolationKey::new("Folder_A"),
        });
        let q = node_query(&protocol, 3).unwrap();
        assert!(q.has_param_key("payload"));
        assert!(!q.has_param_key("role"));
    }
}
