//! In-memory knowledge graph: typed nodes and directed flow edges, all tagged
//! with the isolation key of the upload that produced them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{ElementKind, FlowKind, ParticipantRole};
use crate::isolation::IsolationKey;

/// Isolation boundary for one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    /// Same value as `isolation_key`.
    pub id: String,
    pub name: String,
    pub source_archive: String,
    pub created_at: DateTime<Utc>,
    pub isolation_key: IsolationKey,
}

impl FolderNode {
    pub fn new(
        isolation_key: IsolationKey,
        name: impl Into<String>,
        source_archive: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: isolation_key.to_string(),
            name: name.into(),
            source_archive: source_archive.into(),
            created_at,
            isolation_key,
        }
    }
}

/// One parsed `.iflw` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNode {
    /// Path within the archive.
    pub id: String,
    pub name: String,
    pub skipped_elements: usize,
    pub isolation_key: IsolationKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessElementNode {
    pub id: String,
    pub element_type: ElementKind,
    pub name: String,
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_definition: Option<String>,
    pub isolation_key: IsolationKey,
}

/// Sender/receiver endpoint. `id` is the participant name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantNode {
    pub id: String,
    pub name: String,
    pub role: ParticipantRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub isolation_key: IsolationKey,
}

/// Normalized transport classification. `id` is the canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolNode {
    pub id: String,
    pub name: String,
    pub isolation_key: IsolationKey,
}

/// Which node table a flow endpoint lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EndpointType {
    ProcessElement,
    Participant,
}

impl EndpointType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProcessElement => "ProcessElement",
            Self::Participant => "Participant",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "ProcessElement" => Some(Self::ProcessElement),
            "Participant" => Some(Self::Participant),
            _ => None,
        }
    }
}

/// Directed sequence or message connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub kind: FlowKind,
    pub source: String,
    pub target: String,
    pub isolation_key: IsolationKey,
    /// Id of the first declared connection with this key.
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub source_type: EndpointType,
    pub target_type: EndpointType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl FlowEdge {
    /// Upsert key within one isolation key.
    pub fn key(&self) -> (&str, &str, FlowKind) {
        (&self.source, &self.target, self.kind)
    }
}

/// Any node, tagged with its type for export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GraphNode {
    Folder(FolderNode),
    #[serde(rename = "IFlowDocument")]
    Document(DocumentNode),
    ProcessElement(ProcessElementNode),
    Participant(ParticipantNode),
    Protocol(ProtocolNode),
}

impl GraphNode {
    /// Store label / export type tag.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Folder(_) => "Folder",
            Self::Document(_) => "IFlowDocument",
            Self::ProcessElement(_) => "ProcessElement",
            Self::Participant(_) => "Participant",
            Self::Protocol(_) => "Protocol",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Folder(n) => &n.id,
            Self::Document(n) => &n.id,
            Self::ProcessElement(n) => &n.id,
            Self::Participant(n) => &n.id,
            Self::Protocol(n) => &n.id,
        }
    }

    pub fn isolation_key(&self) -> &IsolationKey {
        match self {
            Self::Folder(n) => &n.isolation_key,
            Self::Document(n) => &n.isolation_key,
            Self::ProcessElement(n) => &n.isolation_key,
            Self::Participant(n) => &n.isolation_key,
            Self::Protocol(n) => &n.isolation_key,
        }
    }
}

/// Counts produced by assembly, consumed by status and export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub documents: usize,
    pub malformed_documents: usize,
    #[serde(default)]
    pub malformed_paths: Vec<String>,
    pub skipped_elements: usize,
    pub elements_by_type: BTreeMap<String, usize>,
    pub participants: usize,
    pub edges_by_kind: BTreeMap<String, usize>,
    pub protocols: usize,
    pub dropped_edges: usize,
    pub merged_edges: usize,
}

/// Status query result: `{folders, nodes, edges, protocols}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub folders: usize,
    pub nodes: usize,
    pub edges: usize,
    pub protocols: usize,
}

/// One assembled, self-contained graph for a single isolation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub folder: FolderNode,
    pub documents: Vec<DocumentNode>,
    pub elements: Vec<ProcessElementNode>,
    pub participants: Vec<ParticipantNode>,
    pub protocols: Vec<ProtocolNode>,
    pub edges: Vec<FlowEdge>,
    pub stats: AssemblyStats,
}

impl KnowledgeGraph {
    pub fn isolation_key(&self) -> &IsolationKey {
        &self.folder.isolation_key
    }

    /// All nodes in creation order: folder, documents, elements, participants, protocols.
    pub fn nodes(&self) -> Vec<GraphNode> {
        std::iter::once(GraphNode::Folder(self.folder.clone()))
            .chain(self.documents.iter().cloned().map(GraphNode::Document))
            .chain(self.elements.iter().cloned().map(GraphNode::ProcessElement))
            .chain(self.participants.iter().cloned().map(GraphNode::Participant))
            .chain(self.protocols.iter().cloned().map(GraphNode::Protocol))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        1 + self.documents.len() + self.elements.len() + self.participants.len() + self.protocols.len()
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            folders: 1,
            nodes: self.node_count(),
            edges: self.edges.len(),
            protocols: self.protocols.len(),
        }
    }

    /// Same node identities and edge set, ignoring order and assembly counters.
    pub fn is_equivalent(&self, other: &KnowledgeGraph) -> bool {
        fn sorted_nodes(g: &KnowledgeGraph) -> Vec<GraphNode> {
            let mut nodes = g.nodes();
            nodes.sort_by(|a, b| (a.label(), a.id()).cmp(&(b.label(), b.id())));
            nodes
        }
        fn sorted_edges(g: &KnowledgeGraph) -> Vec<FlowEdge> {
            let mut edges = g.edges.clone();
            edges.sort_by(|a, b| a.key().cmp(&b.key()));
            edges
        }
        sorted_nodes(self) == sorted_nodes(other) && sorted_edges(self) == sorted_edges(other)
    }

    /// Recompute the structural counters from the node and edge lists.
    ///
    /// Counters that only assembly can know (malformed, skipped, dropped,
    /// merged) are left untouched.
    pub fn refresh_structural_stats(&mut self) {
        let mut elements_by_type = BTreeMap::new();
        for element in &self.elements {
            *elements_by_type
                .entry(element.element_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        let mut edges_by_kind = BTreeMap::new();
        for edge in &self.edges {
            *edges_by_kind.entry(edge.kind.as_str().to_string()).or_insert(0) += 1;
        }
        self.stats.documents = self.documents.len();
        self.stats.elements_by_type = elements_by_type;
        self.stats.edges_by_kind = edges_by_kind;
        self.stats.participants = self.participants.len();
        self.stats.protocols = self.protocols.len();
    }
}
