//! iFlow to knowledge graph transformation.
//!
//! Parses SAP Integration Flow (`.iflw`) documents, classifies their adapter
//! protocols, and assembles one isolated [`KnowledgeGraph`] per upload scope.
//! Persisting the graph lives in `iflow-graph`.

pub mod document;
pub mod error;
pub mod export;
pub mod graph;
pub mod isolation;
pub mod naming;
pub mod pipeline;
pub mod protocol;

pub use document::{parse_document, parse_source, ParsedDocument, SourceFile};
pub use error::{IflowError, IflowResult};
pub use export::ExportDocument;
pub use graph::{GraphBuilder, GraphNode, GraphSummary, KnowledgeGraph};
pub use isolation::{IsolationGranularity, IsolationKey};
pub use pipeline::{build_graphs, Upload};
pub use protocol::{classify, Protocol};
