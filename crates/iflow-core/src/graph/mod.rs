//! Graph assembly and the in-memory knowledge graph model.

pub mod assembler;
pub mod model;

pub use assembler::{assemble, GraphBuilder};
pub use model::{
    AssemblyStats, DocumentNode, EndpointType, FlowEdge, FolderNode, GraphNode, GraphSummary,
    KnowledgeGraph, ParticipantNode, ProcessElementNode, ProtocolNode,
};
