//! Intermediate records produced by the structural parser.
//!
//! Nothing here knows about graphs or stores: these are the declared
//! elements and connections of one `.iflw` document, in document order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw attribute name -> value, including `ifl:property` key/value pairs.
pub type Attributes = BTreeMap<String, String>;

/// One file handed over by the archive collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the archive root, `/`-separated.
    pub path: String,
    pub content: Vec<u8>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into().replace('\\', "/"),
            content: content.into(),
        }
    }

    /// File name without directories and extension.
    pub fn stem(&self) -> &str {
        let file = self.path.rsplit('/').next().unwrap_or(&self.path);
        let cut = file.len().saturating_sub(".iflw".len());
        match file.get(cut..) {
            Some(ext) if ext.eq_ignore_ascii_case(".iflw") => &file[..cut],
            _ => file,
        }
    }

    /// First path component when the file lives inside a directory.
    pub fn top_level_folder(&self) -> Option<&str> {
        let trimmed = self.path.trim_start_matches('/');
        trimmed.split_once('/').map(|(head, _)| head)
    }
}

/// True for archive entries the parser should see.
pub fn is_iflow_path(path: &str) -> bool {
    path.to_lowercase().ends_with(".iflw") && !path.ends_with('/')
}

/// Declared type of a process element, resolved from its BPMN tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    Process,
    SubProcess,
    StartEvent,
    EndEvent,
    IntermediateCatchEvent,
    IntermediateThrowEvent,
    BoundaryEvent,
    ServiceTask,
    CallActivity,
    Task,
    ExclusiveGateway,
    ParallelGateway,
    InclusiveGateway,
    EventBasedGateway,
}

impl ElementKind {
    /// Resolve a BPMN local tag name (`serviceTask`, `callActivity`, ...).
    pub fn from_local_name(tag: &str) -> Option<Self> {
        let kind = match tag {
            "process" => Self::Process,
            "subProcess" => Self::SubProcess,
            "startEvent" => Self::StartEvent,
            "endEvent" => Self::EndEvent,
            "intermediateCatchEvent" => Self::IntermediateCatchEvent,
            "intermediateThrowEvent" => Self::IntermediateThrowEvent,
            "boundaryEvent" => Self::BoundaryEvent,
            "serviceTask" => Self::ServiceTask,
            "callActivity" => Self::CallActivity,
            "task" => Self::Task,
            "exclusiveGateway" => Self::ExclusiveGateway,
            "parallelGateway" => Self::ParallelGateway,
            "inclusiveGateway" => Self::InclusiveGateway,
            "eventBasedGateway" => Self::EventBasedGateway,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "Process",
            Self::SubProcess => "SubProcess",
            Self::StartEvent => "StartEvent",
            Self::EndEvent => "EndEvent",
            Self::IntermediateCatchEvent => "IntermediateCatchEvent",
            Self::IntermediateThrowEvent => "IntermediateThrowEvent",
            Self::BoundaryEvent => "BoundaryEvent",
            Self::ServiceTask => "ServiceTask",
            Self::CallActivity => "CallActivity",
            Self::Task => "Task",
            Self::ExclusiveGateway => "ExclusiveGateway",
            Self::ParallelGateway => "ParallelGateway",
            Self::InclusiveGateway => "InclusiveGateway",
            Self::EventBasedGateway => "EventBasedGateway",
        }
    }

    /// Elements that enclose other elements.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Process | Self::SubProcess)
    }
}

/// Connection kind, derived from the connection's tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowKind {
    Sequence,
    Message,
}

impl FlowKind {
    pub fn from_local_name(tag: &str) -> Option<Self> {
        match tag {
            "sequenceFlow" => Some(Self::Sequence),
            "messageFlow" => Some(Self::Message),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequence => "SEQUENCE",
            Self::Message => "MESSAGE",
        }
    }

    /// Relationship type used in the graph store.
    pub fn rel_type(&self) -> &'static str {
        match self {
            Self::Sequence => "FLOWS_TO",
            Self::Message => "CONNECTS_TO",
        }
    }
}

/// Role of a sender/receiver endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Sender,
    Receiver,
    #[default]
    Unspecified,
}

impl ParticipantRole {
    /// Resolve SAP's `ifl:type` participant attribute.
    ///
    /// SAP exports spell the receiver type `EndpointRecevier`; both spellings
    /// are accepted.
    pub fn from_ifl_type(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "endpointsender" => Self::Sender,
            "endpointrecevier" | "endpointreceiver" => Self::Receiver,
            _ => Self::Unspecified,
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sender" => Self::Sender,
            "receiver" => Self::Receiver,
            _ => Self::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Receiver => "receiver",
            Self::Unspecified => "unspecified",
        }
    }
}

/// A declared process, subprocess, task, event or gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRecord {
    pub id: String,
    pub kind: ElementKind,
    /// Display name, falling back to the id.
    pub name: String,
    /// Enclosing process or subprocess, if any.
    pub parent_id: Option<String>,
    pub attributes: Attributes,
}

/// A declared `participant` in the collaboration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRecord {
    pub id: String,
    pub name: String,
    pub role: ParticipantRole,
    pub process_ref: Option<String>,
    pub attributes: Attributes,
}

impl ParticipantRecord {
    /// Pools wrapping an integration process rather than an external system.
    pub fn is_process_pool(&self) -> bool {
        self.process_ref.is_some()
            && self
                .attributes
                .get("ifl:type")
                .is_some_and(|t| t.eq_ignore_ascii_case("IntegrationProcess"))
    }
}

/// A declared sequence or message flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub id: String,
    pub name: String,
    pub source: String,
    pub target: String,
    pub kind: FlowKind,
    pub attributes: Attributes,
}

/// Why a declaration was not turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// BPMN-namespace declaration the parser has no record type for.
    UnknownElement { tag: String },
    /// Declaration from a vendor or diagram namespace.
    ForeignExtension { tag: String },
    /// Recognized tag without an `id` attribute.
    MissingId { tag: String },
}

impl SkipReason {
    pub fn tag(&self) -> &str {
        match self {
            Self::UnknownElement { tag } | Self::ForeignExtension { tag } | Self::MissingId { tag } => tag,
        }
    }
}

/// A parsed declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Element(ElementRecord),
    Participant(ParticipantRecord),
    Connection(ConnectionRecord),
}

/// Per-declaration parse result: unrecognized declarations degrade to a skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementOutcome {
    Recognized(Record),
    Skipped(SkipReason),
}

/// All records declared by one `.iflw` document, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    /// Path within the archive; unique within one upload.
    pub path: String,
    pub name: String,
    pub elements: Vec<ElementRecord>,
    pub participants: Vec<ParticipantRecord>,
    pub connections: Vec<ConnectionRecord>,
    pub skipped: Vec<SkipReason>,
}

impl ParsedDocument {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Fold one outcome into the document.
    pub fn absorb(&mut self, outcome: ElementOutcome) {
        match outcome {
            ElementOutcome::Recognized(Record::Element(e)) => self.elements.push(e),
            ElementOutcome::Recognized(Record::Participant(p)) => self.participants.push(p),
            ElementOutcome::Recognized(Record::Connection(c)) => self.connections.push(c),
            ElementOutcome::Skipped(reason) => self.skipped.push(reason),
        }
    }
}
