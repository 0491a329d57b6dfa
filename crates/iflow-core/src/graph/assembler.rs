//! Graph assembly: the parsed documents of one isolation key become one
//! [`KnowledgeGraph`].
//!
//! Assembly runs in two passes over the documents, both in document order:
//!
//! 1. every element becomes a `ProcessElement` and its classified protocol is
//!    interned;
//! 2. every connection has both endpoints resolved (own document first, then
//!    the whole upload, then declared participants, then an implicit
//!    participant named after the raw reference) and becomes a `FlowEdge`.
//!
//! Nothing here fails. Dangling connectors and broken documents are counted
//! in [`AssemblyStats`] and logged.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::model::{
    AssemblyStats, DocumentNode, EndpointType, FlowEdge, FolderNode, KnowledgeGraph,
    ParticipantNode, ProcessElementNode, ProtocolNode,
};
use crate::document::{ConnectionRecord, FlowKind, ParsedDocument, ParticipantRole};
use crate::error::IflowError;
use crate::isolation::IsolationKey;
use crate::protocol::{classify, Protocol};

/// Collects parsed documents for one isolation key, then assembles them.
#[derive(Debug)]
pub struct GraphBuilder {
    folder: FolderNode,
    documents: Vec<ParsedDocument>,
    malformed: Vec<String>,
}

impl GraphBuilder {
    pub fn new(folder: FolderNode) -> Self {
        Self {
            folder,
            documents: Vec::new(),
            malformed: Vec::new(),
        }
    }

    pub fn isolation_key(&self) -> &IsolationKey {
        &self.folder.isolation_key
    }

    pub fn add_document(&mut self, document: ParsedDocument) -> &mut Self {
        self.documents.push(document);
        self
    }

    /// Record a document that failed to parse. The rest of the upload proceeds.
    pub fn add_malformed(&mut self, path: &str, error: &IflowError) -> &mut Self {
        warn!(path = %path, error = %error, "Skipping malformed iFlow document");
        self.malformed.push(path.to_string());
        self
    }

    pub fn finish(self) -> KnowledgeGraph {
        let GraphBuilder {
            folder,
            documents,
            malformed,
        } = self;

        let mut assembly = Assembly::new(folder.isolation_key.clone());
        assembly.stats.malformed_documents = malformed.len();
        assembly.stats.malformed_paths = malformed;

        for (index, document) in documents.iter().enumerate() {
            assembly.add_elements(index, document);
        }
        for (index, document) in documents.iter().enumerate() {
            for connection in &document.connections {
                assembly.add_connection(&documents, index, connection);
            }
        }

        let mut graph = KnowledgeGraph {
            folder,
            documents: assembly.documents,
            elements: assembly.elements,
            participants: assembly.participants,
            protocols: assembly.protocols,
            edges: assembly.edges,
            stats: assembly.stats,
        };
        graph.refresh_structural_stats();

        info!(
            isolation_key = %graph.folder.isolation_key,
            documents = graph.stats.documents,
            elements = graph.elements.len(),
            participants = graph.participants.len(),
            protocols = graph.protocols.len(),
            edges = graph.edges.len(),
            dropped_edges = graph.stats.dropped_edges,
            "Assembled knowledge graph"
        );
        graph
    }
}

/// Assemble in one call.
pub fn assemble(folder: FolderNode, documents: Vec<ParsedDocument>) -> KnowledgeGraph {
    let mut builder = GraphBuilder::new(folder);
    for document in documents {
        builder.add_document(document);
    }
    builder.finish()
}

/// Which side of a connection an endpoint sits on.
#[derive(Debug, Clone, Copy)]
enum Side {
    Source,
    Target,
}

impl Side {
    /// Role given to a participant first seen on this side.
    fn implied_role(self) -> ParticipantRole {
        match self {
            Side::Source => ParticipantRole::Sender,
            Side::Target => ParticipantRole::Receiver,
        }
    }
}

/// A participant that will be created if its connection survives.
#[derive(Debug)]
struct ParticipantCandidate {
    name: String,
    role: ParticipantRole,
    participant_type: Option<String>,
    protocol: Option<Protocol>,
}

#[derive(Debug)]
enum Endpoint {
    Element(String),
    Participant(ParticipantCandidate),
}

/// Mutable state of one assembly run. Every index here is scoped to a single
/// isolation key.
struct Assembly {
    key: IsolationKey,
    documents: Vec<DocumentNode>,
    elements: Vec<ProcessElementNode>,
    participants: Vec<ParticipantNode>,
    protocols: Vec<ProtocolNode>,
    edges: Vec<FlowEdge>,
    stats: AssemblyStats,

    element_ids: HashSet<String>,
    /// (document index, raw id) -> node id
    local_elements: HashMap<(usize, String), String>,
    /// raw id -> node id of its first declaration
    upload_elements: HashMap<String, String>,
    participant_by_name: HashMap<String, usize>,
    /// folded protocol key -> protocol node id
    protocol_by_key: HashMap<String, String>,
    edge_keys: HashSet<(String, String, FlowKind)>,
}

impl Assembly {
    fn new(key: IsolationKey) -> Self {
        Self {
            key,
            documents: Vec::new(),
            elements: Vec::new(),
            participants: Vec::new(),
            protocols: Vec::new(),
            edges: Vec::new(),
            stats: AssemblyStats::default(),
            element_ids: HashSet::new(),
            local_elements: HashMap::new(),
            upload_elements: HashMap::new(),
            participant_by_name: HashMap::new(),
            protocol_by_key: HashMap::new(),
            edge_keys: HashSet::new(),
        }
    }

    fn add_elements(&mut self, index: usize, document: &ParsedDocument) {
        let mut skipped = document.skipped.len();
        for reason in &document.skipped {
            debug!(document = %document.path, tag = %reason.tag(), "Skipped declaration");
        }

        for record in &document.elements {
            let Some(node_id) = self.allocate_element_id(index, &document.path, &record.id) else {
                warn!(document = %document.path, id = %record.id, "Duplicate element id within document");
                skipped += 1;
                continue;
            };

            let parent_id = record
                .parent_id
                .as_ref()
                .and_then(|parent| self.local_elements.get(&(index, parent.clone())).cloned());
            let protocol = classify(&record.attributes).map(|p| self.intern_protocol(&p));

            self.local_elements
                .insert((index, record.id.clone()), node_id.clone());
            self.upload_elements
                .entry(record.id.clone())
                .or_insert_with(|| node_id.clone());

            debug!(id = %node_id, kind = record.kind.as_str(), "Assembled process element");
            self.elements.push(ProcessElementNode {
                id: node_id,
                element_type: record.kind,
                name: record.name.clone(),
                document_id: document.path.clone(),
                parent_id,
                protocol,
                activity_type: record.attributes.get("activityType").cloned(),
                event_definition: record.attributes.get("event_definition").cloned(),
                isolation_key: self.key.clone(),
            });
        }

        self.stats.skipped_elements += skipped;
        self.documents.push(DocumentNode {
            id: document.path.clone(),
            name: document.name.clone(),
            skipped_elements: skipped,
            isolation_key: self.key.clone(),
        });
    }

    /// Raw id if free, otherwise `<document id>#<raw id>`. `None` when the
    /// document itself declares the id twice.
    fn allocate_element_id(&mut self, index: usize, document: &str, raw: &str) -> Option<String> {
        if self.local_elements.contains_key(&(index, raw.to_string())) {
            return None;
        }
        let candidates = [raw.to_string(), format!("{document}#{raw}")];
        let id = candidates
            .into_iter()
            .find(|candidate| !self.element_ids.contains(candidate))?;
        self.element_ids.insert(id.clone());
        Some(id)
    }

    fn add_connection(
        &mut self,
        documents: &[ParsedDocument],
        index: usize,
        connection: &ConnectionRecord,
    ) {
        let source = self.resolve(documents, index, &connection.source, Side::Source);
        let target = self.resolve(documents, index, &connection.target, Side::Target);
        let (source, target) = match (source, target) {
            (Some(source), Some(target)) => (source, target),
            (source, _) => {
                let endpoint = if source.is_none() {
                    &connection.source
                } else {
                    &connection.target
                };
                let error = IflowError::UnresolvedEndpoint {
                    connection: connection.id.clone(),
                    endpoint: endpoint.clone(),
                };
                warn!(document = %documents[index].path, "{error}");
                self.stats.dropped_edges += 1;
                return;
            }
        };

        let protocol = classify(&connection.attributes).map(|p| self.intern_protocol(&p));
        let (source_id, source_type) = self.materialize(source, protocol.as_deref());
        let (target_id, target_type) = self.materialize(target, protocol.as_deref());

        let key = (source_id.clone(), target_id.clone(), connection.kind);
        if !self.edge_keys.insert(key) {
            debug!(id = %connection.id, "Merged duplicate connection");
            self.stats.merged_edges += 1;
            return;
        }

        debug!(
            id = %connection.id,
            source = %source_id,
            target = %target_id,
            kind = connection.kind.as_str(),
            "Assembled flow edge"
        );
        self.edges.push(FlowEdge {
            kind: connection.kind,
            source: source_id,
            target: target_id,
            isolation_key: self.key.clone(),
            id: connection.id.clone(),
            name: connection.name.clone(),
            source_type,
            target_type,
            protocol,
        });
    }

    /// Resolve a raw endpoint reference without creating anything.
    fn resolve(
        &self,
        documents: &[ParsedDocument],
        index: usize,
        raw: &str,
        side: Side,
    ) -> Option<Endpoint> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(id) = self.element(index, raw) {
            return Some(Endpoint::Element(id));
        }

        let declared = documents[index]
            .participants
            .iter()
            .map(|p| (index, p))
            .chain(
                documents
                    .iter()
                    .enumerate()
                    .flat_map(|(i, d)| d.participants.iter().map(move |p| (i, p))),
            )
            .find(|(_, p)| p.id == raw);

        let Some((owner, participant)) = declared else {
            return Some(Endpoint::Participant(ParticipantCandidate {
                name: raw.to_string(),
                role: side.implied_role(),
                participant_type: None,
                protocol: None,
            }));
        };

        if participant.is_process_pool() {
            let process = participant
                .process_ref
                .as_deref()
                .and_then(|process_ref| self.element(owner, process_ref.trim()));
            if let Some(id) = process {
                return Some(Endpoint::Element(id));
            }
        }

        let name = participant.name.trim();
        let role = match participant.role {
            ParticipantRole::Unspecified => side.implied_role(),
            role => role,
        };
        Some(Endpoint::Participant(ParticipantCandidate {
            name: if name.is_empty() { raw } else { name }.to_string(),
            role,
            participant_type: participant.attributes.get("ifl:type").cloned(),
            protocol: classify(&participant.attributes),
        }))
    }

    fn element(&self, index: usize, raw: &str) -> Option<String> {
        self.local_elements
            .get(&(index, raw.to_string()))
            .or_else(|| self.upload_elements.get(raw))
            .cloned()
    }

    /// Create the participant behind an endpoint on first reference.
    ///
    /// A participant without its own protocol takes the one declared on the
    /// channel that first reaches it.
    fn materialize(&mut self, endpoint: Endpoint, channel: Option<&str>) -> (String, EndpointType) {
        let candidate = match endpoint {
            Endpoint::Element(id) => return (id, EndpointType::ProcessElement),
            Endpoint::Participant(candidate) => candidate,
        };

        if let Some(&existing) = self.participant_by_name.get(&candidate.name) {
            let participant = &mut self.participants[existing];
            if participant.protocol.is_none() {
                participant.protocol = channel.map(str::to_string);
            }
            return (participant.id.clone(), EndpointType::Participant);
        }

        let protocol = match candidate.protocol {
            Some(p) => Some(self.intern_protocol(&p)),
            None => channel.map(str::to_string),
        };
        debug!(name = %candidate.name, role = candidate.role.as_str(), "Assembled participant");
        self.participant_by_name
            .insert(candidate.name.clone(), self.participants.len());
        self.participants.push(ParticipantNode {
            id: candidate.name.clone(),
            name: candidate.name.clone(),
            role: candidate.role,
            participant_type: candidate.participant_type,
            protocol,
            isolation_key: self.key.clone(),
        });
        (candidate.name, EndpointType::Participant)
    }

    /// Protocol node id for `protocol`, creating the node on first use.
    fn intern_protocol(&mut self, protocol: &Protocol) -> String {
        if let Some(id) = self.protocol_by_key.get(&protocol.key()) {
            return id.clone();
        }
        let id = protocol.name().to_string();
        self.protocol_by_key.insert(protocol.key(), id.clone());
        self.protocols.push(ProtocolNode {
            id: id.clone(),
            name: id.clone(),
            isolation_key: self.key.clone(),
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{parse_document, ElementKind};
    use chrono::{TimeZone, Utc};

    const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn2:definitions xmlns:bpmn2="http://www.omg.org/spec/BPMN/20100524/MODEL"
    xmlns:ifl="http:///com.sap.ifl.model/Ifl.xsd" id="Definitions_1">"#;

    fn doc(path: &str, body: &str) -> ParsedDocument {
        let xml = format!("{HEADER}{body}</bpmn2:definitions>");
        let name = path.trim_end_matches(".iflw");
        parse_document(path, name, xml.as_bytes()).unwrap()
    }

    fn folder(key: &str) -> FolderNode {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        FolderNode::new(IsolationKey::new(key), "Orders", "orders.zip", at)
    }

    fn p1_and_p2() -> Vec<ParsedDocument> {
        vec![
            doc(
                "a.iflw",
                r#"<bpmn2:collaboration id="C1">
                    <bpmn2:messageFlow id="MF1" sourceRef="P1" targetRef="ERP"/>
                </bpmn2:collaboration>
                <bpmn2:process id="P1" name="Order Replication">
                    <bpmn2:extensionElements>
                        <ifl:property><key>ComponentType</key><value>SOAP</value></ifl:property>
                    </bpmn2:extensionElements>
                </bpmn2:process>"#,
            ),
            doc("b.iflw", r#"<bpmn2:process id="P2" name="Unrelated"/>"#),
        ]
    }

    #[test]
    fn test_two_document_scenario() {
        let graph = assemble(folder("A"), p1_and_p2());

        assert_eq!(graph.elements.len(), 2);
        assert_eq!(graph.participants.len(), 1);
        assert_eq!(graph.participants[0].name, "ERP");
        assert_eq!(graph.participants[0].role, ParticipantRole::Receiver);
        assert_eq!(graph.protocols.len(), 1);
        assert_eq!(graph.protocols[0].name, "SOAP");
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].kind, FlowKind::Message);
        assert_eq!(graph.edges[0].target_type, EndpointType::Participant);

        let key = IsolationKey::new("A");
        assert!(graph.nodes().iter().all(|n| n.isolation_key() == &key));
        assert!(graph.edges.iter().all(|e| e.isolation_key == key));
        assert_eq!(graph.stats.documents, 2);
        assert_eq!(graph.stats.edges_by_kind["MESSAGE"], 1);
        assert_eq!(graph.stats.elements_by_type["Process"], 2);
    }

    #[test]
    fn test_distinct_keys_same_structure() {
        let a = assemble(folder("A"), p1_and_p2());
        let b = assemble(folder("B"), p1_and_p2());

        assert_eq!(a.stats.elements_by_type, b.stats.elements_by_type);
        assert_eq!(a.stats.edges_by_kind, b.stats.edges_by_kind);
        assert_eq!(a.node_count(), b.node_count());
        assert_ne!(a.isolation_key(), b.isolation_key());
        assert!(b.nodes().iter().all(|n| n.isolation_key() != a.isolation_key()));
    }

    #[test]
    fn test_empty_endpoint_is_dropped_once() {
        let docs = vec![doc(
            "a.iflw",
            r#"<bpmn2:process id="P1">
                <bpmn2:startEvent id="S"/>
                <bpmn2:sequenceFlow id="F1" sourceRef="S" targetRef="   "/>
                <bpmn2:sequenceFlow id="F2" sourceRef="" targetRef="S"/>
            </bpmn2:process>"#,
        )];
        let graph = assemble(folder("A"), docs);
        assert_eq!(graph.stats.dropped_edges, 2);
        assert!(graph.edges.is_empty());
        assert!(graph.participants.is_empty());
    }

    #[test]
    fn test_protocol_spellings_collapse() {
        let docs = vec![doc(
            "a.iflw",
            r#"<bpmn2:collaboration id="C">
                <bpmn2:messageFlow id="M1" sourceRef="Shop" targetRef="T1">
                    <bpmn2:extensionElements>
                        <ifl:property><key>ComponentType</key><value>SOAP</value></ifl:property>
                    </bpmn2:extensionElements>
                </bpmn2:messageFlow>
                <bpmn2:messageFlow id="M2" sourceRef="T1" targetRef="ERP">
                    <bpmn2:extensionElements>
                        <ifl:property><key>ComponentType</key><value>soap</value></ifl:property>
                    </bpmn2:extensionElements>
                </bpmn2:messageFlow>
            </bpmn2:collaboration>
            <bpmn2:process id="P"><bpmn2:serviceTask id="T1"/></bpmn2:process>"#,
        )];
        let graph = assemble(folder("A"), docs);
        assert_eq!(graph.protocols.len(), 1);
        assert!(graph.edges.iter().all(|e| e.protocol.as_deref() == Some("SOAP")));
        let shop = graph.participants.iter().find(|p| p.name == "Shop").unwrap();
        assert_eq!(shop.role, ParticipantRole::Sender);
        assert_eq!(shop.protocol.as_deref(), Some("SOAP"));
    }

    #[test]
    fn test_declared_participants_and_pools() {
        let docs = vec![doc(
            "a.iflw",
            r#"<bpmn2:collaboration id="C">
                <bpmn2:participant id="Participant_1" ifl:type="EndpointSender" name="Webshop"/>
                <bpmn2:participant id="Participant_2" ifl:type="EndpointRecevier" name="ERP"/>
                <bpmn2:participant id="Pool" ifl:type="IntegrationProcess" name="IP" processRef="Process_1"/>
                <bpmn2:messageFlow id="M1" sourceRef="Participant_1" targetRef="Pool"/>
                <bpmn2:messageFlow id="M2" sourceRef="Process_1" targetRef="Participant_2"/>
            </bpmn2:collaboration>
            <bpmn2:process id="Process_1"/>"#,
        )];
        let graph = assemble(folder("A"), docs);

        let names: Vec<_> = graph.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Webshop", "ERP"]);
        assert_eq!(graph.participants[0].participant_type.as_deref(), Some("EndpointSender"));
        assert_eq!(graph.edges[0].target, "Process_1");
        assert_eq!(graph.edges[0].target_type, EndpointType::ProcessElement);
        assert_eq!(graph.edges[1].target, "ERP");
    }

    #[test]
    fn test_participants_dedupe_across_documents() {
        let body = |p: &str| {
            format!(
                r#"<bpmn2:collaboration id="C">
                    <bpmn2:messageFlow id="M" sourceRef="{p}" targetRef="ERP"/>
                </bpmn2:collaboration>
                <bpmn2:process id="{p}"/>"#
            )
        };
        let docs = vec![doc("a.iflw", &body("P1")), doc("b.iflw", &body("P2"))];
        let graph = assemble(folder("A"), docs);
        assert_eq!(graph.participants.len(), 1);
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn test_colliding_ids_are_qualified_and_resolved_locally() {
        let body = r#"<bpmn2:process id="Process_1">
            <bpmn2:startEvent id="Start"/>
            <bpmn2:endEvent id="End"/>
            <bpmn2:sequenceFlow id="F" sourceRef="Start" targetRef="End"/>
        </bpmn2:process>"#;
        let graph = assemble(folder("A"), vec![doc("x/a.iflw", body), doc("y/b.iflw", body)]);

        assert_eq!(graph.elements.len(), 6);
        assert!(graph.elements.iter().any(|e| e.id == "y/b.iflw#Start"));
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.edges[1].source, "y/b.iflw#Start");
        assert_eq!(graph.edges[1].target, "y/b.iflw#End");

        let start = graph.elements.iter().find(|e| e.id == "y/b.iflw#Start").unwrap();
        assert_eq!(start.parent_id.as_deref(), Some("y/b.iflw#Process_1"));
    }

    #[test]
    fn test_duplicate_connections_merge() {
        let docs = vec![doc(
            "a.iflw",
            r#"<bpmn2:process id="P">
                <bpmn2:task id="A"/><bpmn2:task id="B"/>
                <bpmn2:sequenceFlow id="F1" sourceRef="A" targetRef="B"/>
                <bpmn2:sequenceFlow id="F2" sourceRef="A" targetRef="B"/>
            </bpmn2:process>"#,
        )];
        let graph = assemble(folder("A"), docs);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].id, "F1");
        assert_eq!(graph.stats.merged_edges, 1);
    }

    #[test]
    fn test_script_steps_carry_no_protocol() {
        let docs = vec![doc(
            "a.iflw",
            r#"<bpmn2:process id="P">
                <bpmn2:callActivity id="Script">
                    <bpmn2:extensionElements>
                        <ifl:property><key>activityType</key><value>Script</value></ifl:property>
                        <ifl:property><key>ComponentType</key><value>GroovyScript</value></ifl:property>
                    </bpmn2:extensionElements>
                </bpmn2:callActivity>
                <bpmn2:callActivity id="Map">
                    <bpmn2:extensionElements>
                        <ifl:property><key>ComponentType</key><value>XSLT</value></ifl:property>
                    </bpmn2:extensionElements>
                </bpmn2:callActivity>
            </bpmn2:process>"#,
        )];
        let graph = assemble(folder("A"), docs);
        let map = graph.elements.iter().find(|e| e.id == "Map").unwrap();
        assert_eq!(map.element_type, ElementKind::CallActivity);
        assert_eq!(map.protocol, None);
        let script = graph.elements.iter().find(|e| e.id == "Script").unwrap();
        assert_eq!(script.activity_type.as_deref(), Some("Script"));
    }

    #[test]
    fn test_malformed_documents_are_counted() {
        let mut builder = GraphBuilder::new(folder("A"));
        builder.add_document(doc("ok.iflw", r#"<bpmn2:process id="P"/>"#));
        builder.add_malformed("bad.iflw", &IflowError::malformed("bad.iflw", "unexpected EOF"));
        let graph = builder.finish();
        assert_eq!(graph.stats.documents, 1);
        assert_eq!(graph.stats.malformed_documents, 1);
        assert_eq!(graph.stats.malformed_paths, vec!["bad.iflw".to_string()]);
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let a = assemble(folder("A"), p1_and_p2());
        let b = assemble(folder("A"), p1_and_p2());
        assert_eq!(a.nodes(), b.nodes());
        assert_eq!(a.edges, b.edges);
    }
}
