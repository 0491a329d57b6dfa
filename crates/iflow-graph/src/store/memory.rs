//! In-process graph store.
//!
//! Keyed exactly like the Neo4j store, so counts agree between the two.
//! Availability and latency can be toggled to exercise outage and timeout
//! handling.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use iflow_core::document::FlowKind;
use iflow_core::export::ExportDocument;
use iflow_core::graph::{FlowEdge, FolderNode, GraphNode};
use iflow_core::IsolationKey;

use super::{GraphStore, Link, NodeRef, StoreStats};
use crate::error::{StoreError, StoreResult};

type NodeKey = (IsolationKey, &'static str, String);
type EdgeKey = (IsolationKey, String, String, FlowKind);

#[derive(Debug, Clone)]
struct Stored<T> {
    seq: usize,
    value: T,
}

pub struct MemoryGraphStore {
    nodes: RwLock<HashMap<NodeKey, Stored<GraphNode>>>,
    edges: RwLock<HashMap<EdgeKey, Stored<FlowEdge>>>,
    links: RwLock<HashSet<(IsolationKey, Link)>>,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            edges: RwLock::new(HashMap::new()),
            links: RwLock::new(HashSet::new()),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Simulate the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn gate(&self) -> StoreResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("in-memory store is offline"))
        }
    }

    fn in_scope(key: &IsolationKey, scope: Option<&IsolationKey>) -> bool {
        scope.map_or(true, |s| s == key)
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_node(&self, node: &GraphNode, seq: usize) -> StoreResult<bool> {
        self.gate().await?;
        let key = (node.isolation_key().clone(), node.label(), node.id().to_string());
        let mut nodes = self.nodes.write().await;
        match nodes.get_mut(&key) {
            Some(stored) => {
                stored.value = node.clone();
                Ok(false)
            }
            None => {
                nodes.insert(key, Stored { seq, value: node.clone() });
                Ok(true)
            }
        }
    }

    async fn upsert_link(&self, key: &IsolationKey, link: &Link) -> StoreResult<bool> {
        self.gate().await?;
        let nodes = self.nodes.read().await;
        let exists = |r: &NodeRef| nodes.contains_key(&(key.clone(), r.label, r.id.clone()));
        if !exists(&link.from) || !exists(&link.to) {
            return Ok(false);
        }
        self.links.write().await.insert((key.clone(), link.clone()));
        Ok(true)
    }

    async fn upsert_edge(&self, edge: &FlowEdge, seq: usize) -> StoreResult<bool> {
        self.gate().await?;
        let nodes = self.nodes.read().await;
        let key = edge.isolation_key.clone();
        let source = (key.clone(), edge.source_type.label(), edge.source.clone());
        let target = (key.clone(), edge.target_type.label(), edge.target.clone());
        if !nodes.contains_key(&source) || !nodes.contains_key(&target) {
            return Err(StoreError::decode(format!(
                "edge '{}' has no endpoint nodes under '{}'",
                edge.id, key
            )));
        }
        drop(nodes);

        let edge_key = (key, edge.source.clone(), edge.target.clone(), edge.kind);
        let mut edges = self.edges.write().await;
        match edges.get_mut(&edge_key) {
            Some(stored) => {
                stored.value = edge.clone();
                Ok(false)
            }
            None => {
                edges.insert(edge_key, Stored { seq, value: edge.clone() });
                Ok(true)
            }
        }
    }

    async fn delete_scope(&self, scope: Option<&IsolationKey>) -> StoreResult<usize> {
        self.gate().await?;
        let mut nodes = self.nodes.write().await;
        let before = nodes.len();
        nodes.retain(|(key, _, _), _| !Self::in_scope(key, scope));
        let removed = before - nodes.len();
        self.edges
            .write()
            .await
            .retain(|(key, _, _, _), _| !Self::in_scope(key, scope));
        self.links
            .write()
            .await
            .retain(|(key, _)| !Self::in_scope(key, scope));
        Ok(removed)
    }

    async fn stats(&self, scope: Option<&IsolationKey>) -> StoreResult<StoreStats> {
        self.gate().await?;
        let mut nodes_by_label = BTreeMap::new();
        for (key, label, _) in self.nodes.read().await.keys() {
            if Self::in_scope(key, scope) {
                *nodes_by_label.entry(label.to_string()).or_insert(0) += 1;
            }
        }

        let mut relationships_by_type = BTreeMap::new();
        for (key, _, _, kind) in self.edges.read().await.keys() {
            if Self::in_scope(key, scope) {
                *relationships_by_type
                    .entry(kind.rel_type().to_string())
                    .or_insert(0) += 1;
            }
        }
        for (key, link) in self.links.read().await.iter() {
            if Self::in_scope(key, scope) {
                *relationships_by_type
                    .entry(link.rel_type.to_string())
                    .or_insert(0) += 1;
            }
        }
        Ok(StoreStats::from_breakdown(nodes_by_label, relationships_by_type))
    }

    async fn fetch(&self, scope: Option<&IsolationKey>) -> StoreResult<ExportDocument> {
        self.gate().await?;
        let mut nodes: Vec<_> = self
            .nodes
            .read()
            .await
            .iter()
            .filter(|((key, _, _), _)| Self::in_scope(key, scope))
            .map(|((key, _, _), stored)| (key.clone(), stored.seq, stored.value.clone()))
            .collect();
        nodes.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

        let mut edges: Vec<_> = self
            .edges
            .read()
            .await
            .iter()
            .filter(|((key, _, _, _), _)| Self::in_scope(key, scope))
            .map(|((key, _, _, _), stored)| (key.clone(), stored.seq, stored.value.clone()))
            .collect();
        edges.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

        Ok(ExportDocument {
            nodes: nodes.into_iter().map(|(_, _, n)| n).collect(),
            edges: edges.into_iter().map(|(_, _, e)| e).collect(),
        })
    }

    async fn folders(&self) -> StoreResult<Vec<FolderNode>> {
        self.gate().await?;
        let mut folders: Vec<FolderNode> = self
            .nodes
            .read()
            .await
            .values()
            .filter_map(|stored| match &stored.value {
                GraphNode::Folder(f) => Some(f.clone()),
                _ => None,
            })
            .collect();
        folders.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(folders)
    }
}
