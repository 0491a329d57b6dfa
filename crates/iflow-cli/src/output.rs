//! Terminal output formatting.

use colored::{ColoredString, Colorize};

use iflow_core::graph::{FolderNode, KnowledgeGraph};
use iflow_core::IsolationKey;
use iflow_graph::{StoreStats, SyncResult};

/// Print what assembly produced for one folder.
pub fn print_graph(graph: &KnowledgeGraph) {
    let stats = &graph.stats;
    println!(
        "{} {}",
        graph.folder.name.cyan().bold(),
        format!("({})", graph.isolation_key()).dimmed()
    );
    println!("{}", "─".repeat(50));

    println!("{}: {}", "Documents".bold(), stats.documents);
    if stats.malformed_documents > 0 {
        println!(
            "  {} {} malformed, skipped:",
            "!".yellow(),
            stats.malformed_documents
        );
        for path in &stats.malformed_paths {
            println!("    {}", path.yellow());
        }
    }

    println!("{}: {}", "Elements".bold(), graph.elements.len());
    for (kind, count) in &stats.elements_by_type {
        println!("  {:<28} {}", kind, count);
    }

    let participants: Vec<&str> = graph.participants.iter().map(|p| p.name.as_str()).collect();
    println!(
        "{}: {}",
        "Participants".bold(),
        list_or_none(&participants)
    );

    let protocols: Vec<&str> = graph.protocols.iter().map(|p| p.name.as_str()).collect();
    println!("{}: {}", "Protocols".bold(), list_or_none(&protocols));

    println!("{}: {}", "Edges".bold(), graph.edges.len());
    for (kind, count) in &stats.edges_by_kind {
        println!("  {:<28} {}", kind, count);
    }

    let notes = [
        ("skipped elements", stats.skipped_elements),
        ("dropped edges", stats.dropped_edges),
        ("merged duplicate edges", stats.merged_edges),
    ];
    for (label, count) in notes {
        if count > 0 {
            println!("  {} {} {}", "·".dimmed(), count, label.dimmed());
        }
    }
}

pub fn print_sync_result(result: &SyncResult) {
    println!(
        "{} nodes {} created, {} updated; relationships {} created, {} updated; {} links",
        "Synced:".green().bold(),
        result.nodes_created,
        result.nodes_updated,
        result.relationships_created,
        result.relationships_updated,
        result.links
    );
}

pub fn print_stats(stats: &StoreStats, scope: Option<&IsolationKey>) {
    match scope {
        Some(key) => println!("{} {}", "Folder".bold(), key.as_str().cyan()),
        None => println!("{}", "Knowledge Graph".bold()),
    }
    println!("{}", "─".repeat(40));
    println!("  Folders:   {}", stats.summary.folders);
    println!("  Nodes:     {}", stats.summary.nodes);
    println!("  Edges:     {}", stats.summary.edges);
    println!("  Protocols: {}", stats.summary.protocols);

    if stats.summary.nodes == 0 {
        println!("\n{}", "Nothing stored yet.".dimmed());
        return;
    }

    println!("\n{}", "Nodes by label".bold());
    for (label, count) in &stats.nodes_by_label {
        println!("  {:<20} {}", label_colored(label), count);
    }
    println!("\n{}", "Relationships by type".bold());
    for (rel, count) in &stats.relationships_by_type {
        println!("  {:<20} {}", rel, count);
    }
}

pub fn print_folders(folders: &[FolderNode]) {
    if folders.is_empty() {
        println!("{}", "No folders found.".dimmed());
        return;
    }

    println!("{:<52} {:<28} {}", "Isolation key", "Name", "Created");
    println!("{}", "─".repeat(100));
    for folder in folders {
        println!(
            "{:<52} {:<28} {}",
            folder.id,
            truncate(&folder.name, 26),
            folder.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
}

fn label_colored(label: &str) -> ColoredString {
    match label {
        "Folder" => label.magenta(),
        "IFlowDocument" => label.blue(),
        "ProcessElement" => label.green(),
        "Participant" => label.cyan(),
        "Protocol" => label.yellow(),
        _ => label.normal(),
    }
}

fn list_or_none(items: &[&str]) -> String {
    if items.is_empty() {
        "none".dimmed().to_string()
    } else {
        items.join(", ")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Orders", 10), "Orders");
        assert_eq!(truncate("Order Replication Flow", 6), "Order…");
    }
}
