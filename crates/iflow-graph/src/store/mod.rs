//! Graph store abstraction.
//!
//! A store offers four primitives: pattern-matched merge of nodes and edges,
//! scoped delete, and aggregate counts. [`Neo4jGraphStore`] speaks Cypher over
//! bolt; [`MemoryGraphStore`] keeps everything in process for tests and
//! dry runs.

pub mod memory;
pub mod neo4j;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use iflow_core::export::ExportDocument;
use iflow_core::graph::{FlowEdge, FolderNode, GraphNode, GraphSummary};
use iflow_core::IsolationKey;

use crate::error::StoreResult;

pub use memory::MemoryGraphStore;
pub use neo4j::Neo4jGraphStore;

/// Relationship types that are flow edges; everything else is structural.
pub const FLOW_REL_TYPES: &[&str] = &["FLOWS_TO", "CONNECTS_TO"];

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge one node on `(isolation_key, label, id)`. Returns true if it was created.
    ///
    /// `seq` is the node's position in its graph and orders later fetches.
    async fn upsert_node(&self, node: &GraphNode, seq: usize) -> StoreResult<bool>;

    /// Merge the structural relationship. Returns false when either end is missing.
    async fn upsert_link(&self, key: &IsolationKey, link: &Link) -> StoreResult<bool>;

    /// Merge one flow edge on `(isolation_key, source, target, kind)`. Returns
    /// true if it was created.
    async fn upsert_edge(&self, edge: &FlowEdge, seq: usize) -> StoreResult<bool>;

    /// Delete one folder's subgraph, or every node in the store when `scope`
    /// is `None`. Returns the number of nodes removed.
    async fn delete_scope(&self, scope: Option<&IsolationKey>) -> StoreResult<usize>;

    async fn stats(&self, scope: Option<&IsolationKey>) -> StoreResult<StoreStats>;

    /// All nodes and flow edges, optionally limited to one folder.
    async fn fetch(&self, scope: Option<&IsolationKey>) -> StoreResult<ExportDocument>;

    /// Every Folder in the store, oldest first.
    async fn folders(&self) -> StoreResult<Vec<FolderNode>>;
}

/// Counts reported by `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    #[serde(flatten)]
    pub summary: GraphSummary,
    pub nodes_by_label: BTreeMap<String, usize>,
    pub relationships_by_type: BTreeMap<String, usize>,
}

impl StoreStats {
    /// Fill `summary` from the per-label and per-type breakdowns.
    pub fn from_breakdown(
        nodes_by_label: BTreeMap<String, usize>,
        relationships_by_type: BTreeMap<String, usize>,
    ) -> Self {
        let count = |label: &str| nodes_by_label.get(label).copied().unwrap_or(0);
        let summary = GraphSummary {
            folders: count("Folder"),
            nodes: nodes_by_label.values().sum(),
            edges: FLOW_REL_TYPES
                .iter()
                .map(|t| relationships_by_type.get(*t).copied().unwrap_or(0))
                .sum(),
            protocols: count("Protocol"),
        };
        Self {
            summary,
            nodes_by_label,
            relationships_by_type,
        }
    }
}

/// A node reference inside one isolation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub label: &'static str,
    pub id: String,
}

impl NodeRef {
    pub fn new(label: &'static str, id: impl Into<String>) -> Self {
        Self { label, id: id.into() }
    }
}

/// A structural relationship derived from node attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link {
    pub rel_type: &'static str,
    pub from: NodeRef,
    pub to: NodeRef,
}

/// Structural relationships implied by one node:
///
/// - `(node)-[:BELONGS_TO]->(:Folder)` for every non-folder node
/// - `(:ProcessElement)-[:DECLARED_IN]->(:IFlowDocument)`
/// - `(parent:ProcessElement)-[:CONTAINS]->(child:ProcessElement)`
/// - `(node)-[:USES_PROTOCOL]->(:Protocol)`
pub fn structural_links(node: &GraphNode) -> Vec<Link> {
    let this = NodeRef::new(node.label(), node.id());
    let folder = NodeRef::new("Folder", node.isolation_key().as_str());
    let link = |rel_type, from: &NodeRef, to: NodeRef| Link {
        rel_type,
        from: from.clone(),
        to,
    };

    let mut links = Vec::new();
    if !matches!(node, GraphNode::Folder(_)) {
        links.push(link("BELONGS_TO", &this, folder));
    }
    match node {
        GraphNode::ProcessElement(e) => {
            links.push(link(
                "DECLARED_IN",
                &this,
                NodeRef::new("IFlowDocument", e.document_id.as_str()),
            ));
            if let Some(parent) = &e.parent_id {
                let parent = NodeRef::new("ProcessElement", parent.as_str());
                links.push(link("CONTAINS", &parent, this.clone()));
            }
            if let Some(protocol) = &e.protocol {
                links.push(link("USES_PROTOCOL", &this, NodeRef::new("Protocol", protocol.as_str())));
            }
        }
        GraphNode::Participant(p) => {
            if let Some(protocol) = &p.protocol {
                links.push(link("USES_PROTOCOL", &this, NodeRef::new("Protocol", protocol.as_str())));
            }
        }
        _ => {}
    }
    links
}
