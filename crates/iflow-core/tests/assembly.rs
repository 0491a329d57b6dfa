use chrono::{TimeZone, Utc};
use iflow_core::document::{ElementKind, FlowKind, ParticipantRole, SourceFile};
use iflow_core::graph::EndpointType;
use iflow_core::{build_graphs, IsolationGranularity, KnowledgeGraph, Upload};

const ORDER_PATH: &str =
    "Order_Replication/src/main/resources/scenarioflows/integrationflow/order_replication.iflw";
const CUSTOMER_PATH: &str =
    "Customer_Sync/src/main/resources/scenarioflows/integrationflow/customer_sync.iflw";

fn fixture_upload() -> Upload {
    let files = vec![
        SourceFile::new("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0".to_vec()),
        SourceFile::new(ORDER_PATH, include_bytes!("fixtures/order_replication.iflw").to_vec()),
        SourceFile::new(CUSTOMER_PATH, include_bytes!("fixtures/customer_sync.iflw").to_vec()),
        SourceFile::new(
            "Order_Replication/src/main/resources/scenarioflows/integrationflow/truncated.iflw",
            include_bytes!("fixtures/truncated.iflw").to_vec(),
        ),
    ];
    Upload::new("1718000000_order_bundle.zip", files)
        .with_received_at(Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap())
}

fn single_graph(upload: &Upload) -> KnowledgeGraph {
    let mut graphs = build_graphs(upload, IsolationGranularity::PerUpload);
    assert_eq!(graphs.len(), 1);
    graphs.remove(0)
}

#[test]
fn test_fixture_upload_counts() {
    let graph = single_graph(&fixture_upload());

    assert_eq!(graph.stats.documents, 2);
    assert_eq!(graph.stats.malformed_documents, 1);
    assert_eq!(graph.stats.skipped_elements, 1);
    assert_eq!(graph.elements.len(), 11);
    assert_eq!(graph.stats.elements_by_type["Process"], 2);
    assert_eq!(graph.stats.elements_by_type["StartEvent"], 3);
    assert_eq!(graph.stats.elements_by_type["SubProcess"], 1);
    assert_eq!(graph.stats.edges_by_kind["SEQUENCE"], 6);
    assert_eq!(graph.stats.edges_by_kind["MESSAGE"], 4);
    assert_eq!(graph.stats.dropped_edges, 1);
    assert_eq!(graph.node_count(), 20);

    let protocols: Vec<_> = graph.protocols.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(protocols, vec!["SOAP", "OData", "ProcessDirect"]);
}

#[test]
fn test_fixture_folder_naming() {
    let graph = single_graph(&fixture_upload());
    assert_eq!(graph.folder.name, "Customer Sync");
    assert_eq!(graph.folder.source_archive, "1718000000_order_bundle.zip");
    assert!(graph
        .folder
        .id
        .starts_with("Folder_Customer_Sync_20260504100000_"));
}

#[test]
fn test_fixture_participants() {
    let graph = single_graph(&fixture_upload());

    let names: Vec<_> = graph.participants.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Webshop", "ERP", "CRM"]);

    let webshop = &graph.participants[0];
    assert_eq!(webshop.role, ParticipantRole::Sender);
    assert_eq!(webshop.protocol.as_deref(), Some("SOAP"));

    let erp = &graph.participants[1];
    assert_eq!(erp.role, ParticipantRole::Receiver);
    assert_eq!(erp.protocol.as_deref(), Some("OData"));
    assert_eq!(erp.participant_type.as_deref(), Some("EndpointRecevier"));
}

#[test]
fn test_fixture_elements_and_containment() {
    let graph = single_graph(&fixture_upload());
    let find = |id: &str| graph.elements.iter().find(|e| e.id == id).unwrap();

    let mapping = find("CallActivity_1");
    assert_eq!(mapping.element_type, ElementKind::CallActivity);
    assert_eq!(mapping.activity_type.as_deref(), Some("Mapping"));
    assert_eq!(mapping.protocol, None);
    assert_eq!(mapping.parent_id.as_deref(), Some("Process_1"));

    let start = find("StartEvent_2");
    assert_eq!(start.event_definition.as_deref(), Some("messageEventDefinition"));

    let nested = find("StartEvent_3");
    assert_eq!(nested.parent_id.as_deref(), Some("SubProcess_1"));
    assert_eq!(nested.document_id, CUSTOMER_PATH);

    let qualified = format!("{CUSTOMER_PATH}#StartEvent_2");
    assert_eq!(find(&qualified).name, "Start");
}

#[test]
fn test_fixture_edges_resolve_within_document() {
    let graph = single_graph(&fixture_upload());
    let qualified_start = format!("{CUSTOMER_PATH}#StartEvent_2");

    let crm_edge = graph
        .edges
        .iter()
        .find(|e| e.source == "CRM")
        .unwrap();
    assert_eq!(crm_edge.kind, FlowKind::Message);
    assert_eq!(crm_edge.target, qualified_start);
    assert_eq!(crm_edge.source_type, EndpointType::Participant);
    assert_eq!(crm_edge.target_type, EndpointType::ProcessElement);
    assert_eq!(crm_edge.protocol.as_deref(), Some("ProcessDirect"));

    assert!(graph
        .edges
        .iter()
        .any(|e| e.source == qualified_start && e.target == "SubProcess_1"));
}

#[test]
fn test_fixture_every_edge_endpoint_exists() {
    let graph = single_graph(&fixture_upload());
    let nodes = graph.nodes();
    for edge in &graph.edges {
        for (id, ty) in [(&edge.source, edge.source_type), (&edge.target, edge.target_type)] {
            assert!(
                nodes.iter().any(|n| n.id() == id && n.label() == ty.label()),
                "dangling endpoint {id}"
            );
        }
        assert_eq!(&edge.isolation_key, graph.isolation_key());
    }
}

#[test]
fn test_per_folder_isolation_splits_fixtures() {
    let graphs = build_graphs(&fixture_upload(), IsolationGranularity::PerTopLevelFolder);
    assert_eq!(graphs.len(), 2);

    let order = &graphs[0];
    let customer = &graphs[1];
    assert_eq!(order.folder.name, "Order Replication");
    assert_eq!(order.stats.documents, 1);
    assert_eq!(order.stats.malformed_documents, 1);
    assert_eq!(customer.folder.name, "Customer Sync");

    // No qualification needed once the documents live under separate keys.
    assert!(customer.elements.iter().any(|e| e.id == "StartEvent_2"));
    assert_ne!(order.isolation_key(), customer.isolation_key());
    assert!(order.participants.iter().any(|p| p.name == "ERP"));
    assert!(customer.participants.iter().any(|p| p.name == "ERP"));
}
