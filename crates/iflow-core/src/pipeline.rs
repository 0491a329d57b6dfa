//! Upload pipeline: files of one archive -> isolation scopes -> graphs.
//!
//! Runs synchronously; archives are small and each document parses quickly.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::document::{is_iflow_path, parse_source, SourceFile};
use crate::graph::{FolderNode, GraphBuilder, KnowledgeGraph};
use crate::isolation::{IsolationGranularity, IsolationKey};
use crate::naming::{clean_folder_name, derive_folder_name};

/// One received archive, already unpacked into `(path, bytes)` pairs.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Archive file name as received.
    pub source_archive: String,
    /// Display name for the Folder.
    pub name: String,
    pub files: Vec<SourceFile>,
    pub received_at: DateTime<Utc>,
}

impl Upload {
    /// Name the upload from its own paths and archive name.
    pub fn new(source_archive: impl Into<String>, files: Vec<SourceFile>) -> Self {
        let source_archive = source_archive.into();
        let name = derive_folder_name(files.iter().map(|f| f.path.as_str()), &source_archive);
        Self {
            source_archive,
            name,
            files,
            received_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }
}

/// Files that share one isolation key.
#[derive(Debug, Clone)]
pub struct Scope {
    pub folder: FolderNode,
    pub files: Vec<SourceFile>,
}

/// Split an upload into isolation scopes and mint a fresh key for each.
///
/// Non-`.iflw` entries are dropped here. With
/// [`IsolationGranularity::PerTopLevelFolder`], files at the archive root
/// share the upload's own key; every top-level directory gets a child key.
/// Directory names that sanitize to the same child key get a numeric suffix.
pub fn partition(upload: &Upload, granularity: IsolationGranularity) -> Vec<Scope> {
    let base = IsolationKey::mint_at(&upload.name, upload.received_at);
    let folder = |key: IsolationKey, name: &str| {
        FolderNode::new(key, name, &upload.source_archive, upload.received_at)
    };
    let files = upload.files.iter().filter(|f| is_iflow_path(&f.path)).cloned();

    match granularity {
        IsolationGranularity::PerUpload => vec![Scope {
            folder: folder(base, &upload.name),
            files: files.collect(),
        }],
        IsolationGranularity::PerTopLevelFolder => {
            let mut root = Vec::new();
            let mut groups: Vec<(String, Vec<SourceFile>)> = Vec::new();
            for file in files {
                let Some(dir) = file.top_level_folder().map(str::to_string) else {
                    root.push(file);
                    continue;
                };
                match groups.iter_mut().find(|(name, _)| *name == dir) {
                    Some((_, group)) => group.push(file),
                    None => groups.push((dir, vec![file])),
                }
            }

            let mut scopes = Vec::with_capacity(groups.len() + 1);
            let mut used: HashSet<IsolationKey> = HashSet::new();
            used.insert(base.clone());
            if !root.is_empty() || groups.is_empty() {
                scopes.push(Scope {
                    folder: folder(base.clone(), &upload.name),
                    files: root,
                });
            }
            for (dir, files) in groups {
                let name = clean_folder_name(&dir).unwrap_or_else(|| dir.clone());
                let mut key = base.child(&dir);
                let mut n = 2;
                while used.contains(&key) {
                    key = base.child(&format!("{dir}_{n}"));
                    n += 1;
                }
                used.insert(key.clone());
                scopes.push(Scope {
                    folder: folder(key, &name),
                    files,
                });
            }
            scopes
        }
    }
}

/// Parse every file of a scope and assemble its graph.
///
/// A malformed document is counted and skipped; the others still load.
pub fn build_graph(scope: Scope) -> KnowledgeGraph {
    let mut builder = GraphBuilder::new(scope.folder);
    for file in &scope.files {
        match parse_source(file) {
            Ok(document) => {
                builder.add_document(document);
            }
            Err(e) => {
                builder.add_malformed(&file.path, &e);
            }
        }
    }
    builder.finish()
}

/// Full pipeline for one upload: partition, parse, classify, assemble.
pub fn build_graphs(upload: &Upload, granularity: IsolationGranularity) -> Vec<KnowledgeGraph> {
    let total = upload.files.len();
    let iflows = upload.files.iter().filter(|f| is_iflow_path(&f.path)).count();
    if iflows == 0 {
        warn!(archive = %upload.source_archive, "Upload contains no .iflw documents");
    }
    info!(
        archive = %upload.source_archive,
        name = %upload.name,
        files = total,
        iflows = iflows,
        granularity = granularity.as_str(),
        "Processing upload"
    );

    partition(upload, granularity)
        .into_iter()
        .map(build_graph)
        .collect()
}
