//! Streaming parser for `.iflw` (BPMN 2.0 + SAP `ifl`) documents.
//!
//! The document is walked once with a namespace-aware reader. A frame stack
//! tracks whether the current position holds declarations (definitions,
//! collaboration, process, subProcess), details of one declared record, or
//! an `ifl:property` inside `extensionElements`. Anything the parser has no
//! record type for is skipped together with its subtree.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use tracing::debug;

use super::model::{
    Attributes, ConnectionRecord, ElementKind, ElementOutcome, ElementRecord, FlowKind,
    ParsedDocument, ParticipantRecord, ParticipantRole, Record, SkipReason,
};
use crate::error::{IflowError, IflowResult};

/// BPMN 2.0 model namespace; the document root must live here.
pub const BPMN_NS: &[u8] = b"http://www.omg.org/spec/BPMN/20100524/MODEL";

/// BPMN tags that carry no declaration worth recording.
const IGNORED_DECLARATIONS: &[&str] = &["documentation", "laneSet"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ns {
    Bpmn,
    Other,
}

fn classify(ns: &ResolveResult<'_>) -> Ns {
    match ns {
        ResolveResult::Bound(Namespace(uri)) if *uri == BPMN_NS => Ns::Bpmn,
        _ => Ns::Other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Key,
    Value,
}

#[derive(Debug)]
enum Frame {
    /// Children are declarations.
    Scope {
        container: Option<String>,
        owner: Option<usize>,
    },
    /// Children are details of a declared record.
    Record { owner: usize },
    Extension { owner: Option<usize> },
    Property { owner: Option<usize> },
    PropertyPart(Part),
    /// Subtree ignored entirely.
    Opaque,
}

/// Parse one iFlow document.
///
/// Fails with [`IflowError::MalformedDocument`] when the content is not
/// well-formed XML or the root is not a BPMN `definitions` element. Unknown
/// or vendor-specific declarations are recorded as skips, never as errors.
pub fn parse_document(path: &str, name: &str, content: &[u8]) -> IflowResult<ParsedDocument> {
    let mut reader = NsReader::from_reader(content);
    let mut buf = Vec::new();
    let mut walker = Walker::new(path);

    loop {
        match reader.read_resolved_event_into(&mut buf) {
            Ok((ns, Event::Start(e))) => walker.open(&e, classify(&ns), false)?,
            Ok((ns, Event::Empty(e))) => walker.open(&e, classify(&ns), true)?,
            Ok((_, Event::End(_))) => walker.close(),
            Ok((_, Event::Text(t))) => {
                let text = t
                    .unescape()
                    .map_err(|e| IflowError::malformed(path, e.to_string()))?;
                walker.text(&text);
            }
            Ok((_, Event::CData(c))) => walker.text(&String::from_utf8_lossy(&c)),
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(IflowError::malformed(
                    path,
                    format!("XML error at byte {}: {}", reader.buffer_position(), e),
                ));
            }
        }
        buf.clear();
    }

    walker.finish(name)
}

struct Walker<'p> {
    path: &'p str,
    stack: Vec<Frame>,
    outcomes: Vec<ElementOutcome>,
    root_seen: bool,
    property: (String, String),
    anonymous_connections: usize,
}

impl<'p> Walker<'p> {
    fn new(path: &'p str) -> Self {
        Self {
            path,
            stack: Vec::new(),
            outcomes: Vec::new(),
            root_seen: false,
            property: (String::new(), String::new()),
            anonymous_connections: 0,
        }
    }

    fn open(&mut self, e: &BytesStart<'_>, ns: Ns, empty: bool) -> IflowResult<()> {
        let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        let frame = match self.stack.last() {
            None => {
                if self.root_seen {
                    return Err(IflowError::malformed(self.path, "multiple root elements"));
                }
                if ns != Ns::Bpmn || local != "definitions" {
                    return Err(IflowError::malformed(
                        self.path,
                        format!("expected BPMN 'definitions' root, found '{}'", qualified(e)),
                    ));
                }
                self.root_seen = true;
                Frame::Scope {
                    container: None,
                    owner: None,
                }
            }
            Some(Frame::Scope { container, owner }) => {
                let (container, owner) = (container.clone(), *owner);
                self.declaration(e, ns, &local, container, owner)?
            }
            Some(Frame::Record { owner }) => {
                let owner = *owner;
                if ns == Ns::Bpmn && local == "extensionElements" {
                    Frame::Extension { owner: Some(owner) }
                } else {
                    if ns == Ns::Bpmn && local.ends_with("EventDefinition") {
                        if let Some(attrs) = self.attributes_mut(owner) {
                            attrs.entry("event_definition".to_string()).or_insert(local);
                        }
                    }
                    Frame::Opaque
                }
            }
            Some(Frame::Extension { owner }) => {
                if local == "property" {
                    self.property = (String::new(), String::new());
                    Frame::Property { owner: *owner }
                } else {
                    Frame::Opaque
                }
            }
            Some(Frame::Property { .. }) => match local.as_str() {
                "key" => Frame::PropertyPart(Part::Key),
                "value" => Frame::PropertyPart(Part::Value),
                _ => Frame::Opaque,
            },
            Some(Frame::PropertyPart(_)) | Some(Frame::Opaque) => Frame::Opaque,
        };

        self.stack.push(frame);
        if empty {
            self.close();
        }
        Ok(())
    }

    /// Handle a child of a declaration scope.
    fn declaration(
        &mut self,
        e: &BytesStart<'_>,
        ns: Ns,
        local: &str,
        container: Option<String>,
        scope_owner: Option<usize>,
    ) -> IflowResult<Frame> {
        if ns != Ns::Bpmn {
            self.skip(SkipReason::ForeignExtension { tag: qualified(e) });
            return Ok(Frame::Opaque);
        }

        if local == "extensionElements" {
            return Ok(Frame::Extension { owner: scope_owner });
        }
        if local == "collaboration" {
            return Ok(Frame::Scope {
                container,
                owner: None,
            });
        }
        if IGNORED_DECLARATIONS.contains(&local) {
            return Ok(Frame::Opaque);
        }

        let attributes = self.read_attributes(e)?;

        if let Some(kind) = ElementKind::from_local_name(local) {
            let Some(id) = non_empty(attributes.get("id")) else {
                self.skip(SkipReason::MissingId { tag: local.to_string() });
                return Ok(Frame::Opaque);
            };
            let record = ElementRecord {
                name: display_name(&attributes, &id),
                id: id.clone(),
                kind,
                parent_id: container.clone(),
                attributes,
            };
            let owner = self.push(Record::Element(record));
            return Ok(if kind.is_container() {
                Frame::Scope {
                    container: Some(id),
                    owner: Some(owner),
                }
            } else {
                Frame::Record { owner }
            });
        }

        if local == "participant" {
            let Some(id) = non_empty(attributes.get("id")) else {
                self.skip(SkipReason::MissingId { tag: local.to_string() });
                return Ok(Frame::Opaque);
            };
            let record = ParticipantRecord {
                name: display_name(&attributes, &id),
                role: attributes
                    .get("ifl:type")
                    .map(|t| ParticipantRole::from_ifl_type(t))
                    .unwrap_or_default(),
                process_ref: non_empty(attributes.get("processRef")),
                id,
                attributes,
            };
            let owner = self.push(Record::Participant(record));
            return Ok(Frame::Record { owner });
        }

        if let Some(kind) = FlowKind::from_local_name(local) {
            let id = match non_empty(attributes.get("id")) {
                Some(id) => id,
                None => {
                    self.anonymous_connections += 1;
                    format!("{}_{}", local, self.anonymous_connections)
                }
            };
            let record = ConnectionRecord {
                name: attributes
                    .get("name")
                    .map(|n| n.trim().to_string())
                    .unwrap_or_default(),
                source: attributes.get("sourceRef").cloned().unwrap_or_default(),
                target: attributes.get("targetRef").cloned().unwrap_or_default(),
                id,
                kind,
                attributes,
            };
            let owner = self.push(Record::Connection(record));
            return Ok(Frame::Record { owner });
        }

        self.skip(SkipReason::UnknownElement { tag: local.to_string() });
        Ok(Frame::Opaque)
    }

    fn close(&mut self) {
        if let Some(Frame::Property { owner: Some(owner) }) = self.stack.pop() {
            let (key, value) = std::mem::take(&mut self.property);
            let key = key.trim();
            if key.is_empty() {
                return;
            }
            let value = value.trim().to_string();
            if let Some(attrs) = self.attributes_mut(owner) {
                attrs.entry(key.to_string()).or_insert(value);
            }
        }
    }

    fn text(&mut self, text: &str) {
        match self.stack.last() {
            Some(Frame::PropertyPart(Part::Key)) => self.property.0.push_str(text),
            Some(Frame::PropertyPart(Part::Value)) => self.property.1.push_str(text),
            _ => {}
        }
    }

    fn finish(self, name: &str) -> IflowResult<ParsedDocument> {
        if !self.root_seen {
            return Err(IflowError::malformed(self.path, "document has no root element"));
        }
        if !self.stack.is_empty() {
            return Err(IflowError::malformed(self.path, "unexpected end of document"));
        }

        let mut doc = ParsedDocument::new(self.path, name);
        for outcome in self.outcomes {
            doc.absorb(outcome);
        }
        debug!(
            path = %doc.path,
            elements = doc.elements.len(),
            participants = doc.participants.len(),
            connections = doc.connections.len(),
            skipped = doc.skipped.len(),
            "Parsed iFlow document"
        );
        Ok(doc)
    }

    fn push(&mut self, record: Record) -> usize {
        self.outcomes.push(ElementOutcome::Recognized(record));
        self.outcomes.len() - 1
    }

    fn skip(&mut self, reason: SkipReason) {
        debug!(path = self.path, tag = reason.tag(), "Skipping declaration");
        self.outcomes.push(ElementOutcome::Skipped(reason));
    }

    fn attributes_mut(&mut self, owner: usize) -> Option<&mut Attributes> {
        match self.outcomes.get_mut(owner)? {
            ElementOutcome::Recognized(Record::Element(r)) => Some(&mut r.attributes),
            ElementOutcome::Recognized(Record::Participant(r)) => Some(&mut r.attributes),
            ElementOutcome::Recognized(Record::Connection(r)) => Some(&mut r.attributes),
            ElementOutcome::Skipped(_) => None,
        }
    }

    fn read_attributes(&self, e: &BytesStart<'_>) -> IflowResult<Attributes> {
        let mut attributes = Attributes::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| IflowError::malformed(self.path, err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            let value: Cow<'_, str> = attr
                .unescape_value()
                .map_err(|err| IflowError::malformed(self.path, err.to_string()))?;
            attributes.insert(key, value.into_owned());
        }
        Ok(attributes)
    }
}

fn qualified(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn display_name(attributes: &Attributes, id: &str) -> String {
    non_empty(attributes.get("name")).unwrap_or_else(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn2:definitions xmlns:bpmn2="http://www.omg.org/spec/BPMN/20100524/MODEL"
    xmlns:bpmndi="http://www.omg.org/spec/BPMN/20100524/DI"
    xmlns:ifl="http:///com.sap.ifl.model/Ifl.xsd" id="Definitions_1">"#;

    fn doc(body: &str) -> String {
        format!("{HEADER}{body}</bpmn2:definitions>")
    }

    #[test]
    fn test_parses_elements_in_document_order() {
        let xml = doc(r#"
            <bpmn2:process id="Process_1" name="Integration Process">
                <bpmn2:startEvent id="StartEvent_2" name="Start">
                    <bpmn2:outgoing>SequenceFlow_3</bpmn2:outgoing>
                    <bpmn2:messageEventDefinition/>
                </bpmn2:startEvent>
                <bpmn2:callActivity id="CallActivity_5">
                    <bpmn2:extensionElements>
                        <ifl:property><key>activityType</key><value>Enricher</value></ifl:property>
                    </bpmn2:extensionElements>
                </bpmn2:callActivity>
                <bpmn2:sequenceFlow id="SequenceFlow_3" sourceRef="StartEvent_2" targetRef="CallActivity_5"/>
            </bpmn2:process>"#);

        let parsed = parse_document("f.iflw", "f", xml.as_bytes()).unwrap();
        let ids: Vec<_> = parsed.elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["Process_1", "StartEvent_2", "CallActivity_5"]);

        let start = &parsed.elements[1];
        assert_eq!(start.kind, ElementKind::StartEvent);
        assert_eq!(start.parent_id.as_deref(), Some("Process_1"));
        assert_eq!(start.attributes["event_definition"], "messageEventDefinition");

        let call = &parsed.elements[2];
        assert_eq!(call.name, "CallActivity_5", "name falls back to id");
        assert_eq!(call.attributes["activityType"], "Enricher");

        assert_eq!(parsed.connections.len(), 1);
        assert_eq!(parsed.connections[0].kind, FlowKind::Sequence);
        assert_eq!(parsed.connections[0].source, "StartEvent_2");
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn test_message_flow_properties_and_participants() {
        let xml = doc(r#"
            <bpmn2:collaboration id="Collaboration_1" name="Default Collaboration">
                <bpmn2:extensionElements>
                    <ifl:property><key>namespaceMapping</key><value/></ifl:property>
                </bpmn2:extensionElements>
                <bpmn2:participant id="Participant_1" ifl:type="EndpointSender" name="Sender"/>
                <bpmn2:participant id="Participant_2" ifl:type="EndpointRecevier" name="ERP"/>
                <bpmn2:participant id="Participant_Process_1" ifl:type="IntegrationProcess"
                    name="Integration Process" processRef="Process_1"/>
                <bpmn2:messageFlow id="MessageFlow_4" name="SOAP" sourceRef="Participant_1" targetRef="StartEvent_2">
                    <bpmn2:extensionElements>
                        <ifl:property><key>ComponentType</key><value>SOAP</value></ifl:property>
                        <ifl:property><key>address</key><value>/orders &amp; more</value></ifl:property>
                    </bpmn2:extensionElements>
                </bpmn2:messageFlow>
            </bpmn2:collaboration>"#);

        let parsed = parse_document("f.iflw", "f", xml.as_bytes()).unwrap();
        assert_eq!(parsed.participants.len(), 3);
        assert_eq!(parsed.participants[0].role, ParticipantRole::Sender);
        assert_eq!(parsed.participants[1].role, ParticipantRole::Receiver);
        assert!(parsed.participants[2].is_process_pool());

        let flow = &parsed.connections[0];
        assert_eq!(flow.kind, FlowKind::Message);
        assert_eq!(flow.name, "SOAP");
        assert_eq!(flow.attributes["ComponentType"], "SOAP");
        assert_eq!(flow.attributes["address"], "/orders & more");
    }

    #[test]
    fn test_unknown_and_vendor_elements_are_skipped() {
        let xml = doc(r#"
            <bpmn2:process id="Process_1">
                <bpmn2:dataObject id="DataObject_1"/>
                <bpmn2:serviceTask name="no id"/>
                <bpmn2:endEvent id="EndEvent_9"/>
            </bpmn2:process>
            <bpmndi:BPMNDiagram id="BPMNDiagram_1">
                <bpmndi:BPMNPlane bpmnElement="Collaboration_1"/>
            </bpmndi:BPMNDiagram>"#);

        let parsed = parse_document("f.iflw", "f", xml.as_bytes()).unwrap();
        assert_eq!(parsed.elements.len(), 2);
        assert_eq!(
            parsed.skipped,
            vec![
                SkipReason::UnknownElement { tag: "dataObject".into() },
                SkipReason::MissingId { tag: "serviceTask".into() },
                SkipReason::ForeignExtension { tag: "bpmndi:BPMNDiagram".into() },
            ]
        );
    }

    #[test]
    fn test_subprocess_children_take_subprocess_parent() {
        let xml = doc(r#"
            <bpmn2:process id="Process_1">
                <bpmn2:subProcess id="SubProcess_7" name="Exception Subprocess">
                    <bpmn2:startEvent id="StartEvent_8"><bpmn2:errorEventDefinition/></bpmn2:startEvent>
                </bpmn2:subProcess>
                <bpmn2:endEvent id="EndEvent_9"/>
            </bpmn2:process>"#);

        let parsed = parse_document("f.iflw", "f", xml.as_bytes()).unwrap();
        let parents: Vec<_> = parsed
            .elements
            .iter()
            .map(|e| (e.id.as_str(), e.parent_id.as_deref()))
            .collect();
        assert_eq!(
            parents,
            [
                ("Process_1", None),
                ("SubProcess_7", Some("Process_1")),
                ("StartEvent_8", Some("SubProcess_7")),
                ("EndEvent_9", Some("Process_1")),
            ]
        );
    }

    #[test]
    fn test_rejects_non_xml() {
        let err = parse_document("bad.iflw", "bad", b"this is not xml <<<").unwrap_err();
        assert!(matches!(err, IflowError::MalformedDocument { .. }));
    }

    #[test]
    fn test_rejects_unclosed_document() {
        let xml = format!("{HEADER}<bpmn2:process id=\"P\">");
        let err = parse_document("bad.iflw", "bad", xml.as_bytes()).unwrap_err();
        assert!(matches!(err, IflowError::MalformedDocument { .. }));
    }

    #[test]
    fn test_rejects_wrong_root_namespace() {
        let xml = r#"<definitions xmlns="urn:something-else"><process id="P"/></definitions>"#;
        let err = parse_document("bad.iflw", "bad", xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("expected BPMN 'definitions' root"));
    }

    #[test]
    fn test_default_namespace_root_is_accepted() {
        let xml = r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL">
            <process id="P1"/></definitions>"#;
        let parsed = parse_document("ok.iflw", "ok", xml.as_bytes()).unwrap();
        assert_eq!(parsed.elements.len(), 1);
        assert_eq!(parsed.elements[0].kind, ElementKind::Process);
    }
}
