//! Portable JSON export: `{"nodes": [...], "edges": [...]}`.
//!
//! Nodes carry a `type` tag (`Folder`, `IFlowDocument`, `ProcessElement`,
//! `Participant`, `Protocol`) and flat primitive attributes. Edges carry
//! `kind`, `source`, `target` and `isolation_key`. The same document shape is
//! produced from an assembled graph and from a store fetch.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{IflowError, IflowResult};
use crate::graph::{AssemblyStats, FlowEdge, GraphNode, KnowledgeGraph};
use crate::isolation::IsolationKey;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<FlowEdge>,
}

impl ExportDocument {
    pub fn from_graph(graph: &KnowledgeGraph) -> Self {
        Self {
            nodes: graph.nodes(),
            edges: graph.edges.clone(),
        }
    }

    /// Concatenate several graphs, e.g. every folder of a full export.
    pub fn from_graphs<'a>(graphs: impl IntoIterator<Item = &'a KnowledgeGraph>) -> Self {
        let mut doc = Self::default();
        for graph in graphs {
            doc.nodes.extend(graph.nodes());
            doc.edges.extend(graph.edges.iter().cloned());
        }
        doc
    }

    pub fn to_json(&self) -> IflowResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> IflowResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Rebuild the single graph this document describes.
    ///
    /// Fails unless there is exactly one Folder, every node and edge carries
    /// its key, and every edge endpoint exists.
    pub fn reconstruct(self) -> IflowResult<KnowledgeGraph> {
        let mut graphs = self.into_graphs()?;
        match graphs.len() {
            1 => Ok(graphs.remove(0)),
            n => Err(IflowError::invalid_export(format!(
                "expected exactly one Folder, found {n}"
            ))),
        }
    }

    /// Split into one graph per Folder, ordered by first appearance.
    pub fn into_graphs(self) -> IflowResult<Vec<KnowledgeGraph>> {
        let mut order: Vec<IsolationKey> = Vec::new();
        let mut parts: BTreeMap<IsolationKey, Parts> = BTreeMap::new();

        for node in self.nodes {
            let key = node.isolation_key().clone();
            if let GraphNode::Folder(folder) = &node {
                if folder.id != folder.isolation_key.as_str() {
                    return Err(IflowError::invalid_export(format!(
                        "Folder '{}' does not match its isolation key '{}'",
                        folder.id, folder.isolation_key
                    )));
                }
                order.push(key.clone());
            }
            parts.entry(key).or_default().nodes.push(node);
        }
        for edge in self.edges {
            parts
                .entry(edge.isolation_key.clone())
                .or_default()
                .edges
                .push(edge);
        }

        if let Some(orphan) = parts.keys().find(|k| !order.contains(*k)) {
            return Err(IflowError::invalid_export(format!(
                "isolation key '{orphan}' has no Folder node"
            )));
        }

        order
            .into_iter()
            .map(|key| {
                let part = parts.remove(&key).unwrap_or_default();
                part.into_graph(&key)
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Parts {
    nodes: Vec<GraphNode>,
    edges: Vec<FlowEdge>,
}

impl Parts {
    fn into_graph(self, key: &IsolationKey) -> IflowResult<KnowledgeGraph> {
        let mut folder = None;
        let mut documents = Vec::new();
        let mut elements = Vec::new();
        let mut participants = Vec::new();
        let mut protocols = Vec::new();
        let mut seen: HashSet<(&'static str, String)> = HashSet::new();

        for node in self.nodes {
            if !seen.insert((node.label(), node.id().to_string())) {
                return Err(IflowError::invalid_export(format!(
                    "duplicate {} '{}' under '{key}'",
                    node.label(),
                    node.id()
                )));
            }
            match node {
                GraphNode::Folder(f) => {
                    if folder.replace(f).is_some() {
                        return Err(IflowError::invalid_export(format!(
                            "more than one Folder for '{key}'"
                        )));
                    }
                }
                GraphNode::Document(d) => documents.push(d),
                GraphNode::ProcessElement(e) => elements.push(e),
                GraphNode::Participant(p) => participants.push(p),
                GraphNode::Protocol(p) => protocols.push(p),
            }
        }

        for edge in &self.edges {
            for (id, endpoint) in [(&edge.source, edge.source_type), (&edge.target, edge.target_type)] {
                if !seen.contains(&(endpoint.label(), id.clone())) {
                    return Err(IflowError::invalid_export(format!(
                        "edge '{}' references missing {} '{}'",
                        edge.id,
                        endpoint.label(),
                        id
                    )));
                }
            }
        }

        let folder = folder.ok_or_else(|| {
            IflowError::invalid_export(format!("no Folder for '{key}'"))
        })?;
        let mut graph = KnowledgeGraph {
            folder,
            documents,
            elements,
            participants,
            protocols,
            edges: self.edges,
            stats: AssemblyStats::default(),
        };
        graph.refresh_structural_stats();
        Ok(graph)
    }
}

/// Export one assembled graph as pretty JSON.
pub fn export_graph(graph: &KnowledgeGraph) -> IflowResult<String> {
    ExportDocument::from_graph(graph).to_json()
}

/// Parse an export produced by [`export_graph`] back into a graph.
pub fn reconstruct(json: &str) -> IflowResult<KnowledgeGraph> {
    ExportDocument::from_json(json)?.reconstruct()
}
