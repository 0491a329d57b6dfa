//! iFlow document parsing (bytes -> declared records).

pub mod model;
pub mod parser;

pub use model::{
    is_iflow_path, Attributes, ConnectionRecord, ElementKind, ElementOutcome, ElementRecord,
    FlowKind, ParsedDocument, ParticipantRecord, ParticipantRole, Record, SkipReason, SourceFile,
};
pub use parser::parse_document;

use crate::error::IflowResult;

/// Parse one archive entry, naming the document after its file stem.
pub fn parse_source(file: &SourceFile) -> IflowResult<ParsedDocument> {
    parse_document(&file.path, file.stem(), &file.content)
}
