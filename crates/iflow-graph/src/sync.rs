//! Knowledge graph to store synchronization.
//!
//! Upserts an assembled graph in three passes (nodes, structural links, flow
//! edges), bounds every store call with a timeout, and guards the one
//! globally destructive operation: an unscoped `clear` is refused while any
//! synchronization is in flight, and new synchronizations are refused while
//! it runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use iflow_core::export::ExportDocument;
use iflow_core::graph::{FolderNode, KnowledgeGraph};
use iflow_core::IsolationKey;

use crate::error::{within, StoreError, StoreResult};
use crate::store::{structural_links, GraphStore, StoreStats};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a sync operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub relationships_created: usize,
    pub relationships_updated: usize,
    pub links: usize,
}

impl SyncResult {
    pub fn merge(&mut self, other: &SyncResult) {
        self.nodes_created += other.nodes_created;
        self.nodes_updated += other.nodes_updated;
        self.relationships_created += other.relationships_created;
        self.relationships_updated += other.relationships_updated;
        self.links += other.links;
    }
}

#[derive(Debug, Default)]
struct Activity {
    in_flight: HashMap<IsolationKey, usize>,
    clearing: bool,
}

impl Activity {
    fn in_flight(&self) -> usize {
        self.in_flight.values().sum()
    }
}

pub struct GraphSynchronizer<S> {
    store: S,
    timeout: Duration,
    activity: Mutex<Activity>,
}

impl<S: GraphStore> GraphSynchronizer<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            timeout: DEFAULT_TIMEOUT,
            activity: Mutex::new(Activity::default()),
        }
    }

    /// Bound every store call; an expired call surfaces as `StoreError::Unavailable`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of synchronizations currently running.
    pub fn in_flight(&self) -> usize {
        self.activity().in_flight()
    }

    /// Upsert `graph` under its isolation key.
    ///
    /// Idempotent for the same graph. On failure the graph is untouched and
    /// the call can be repeated without re-parsing.
    pub async fn synchronize(&self, graph: &KnowledgeGraph) -> StoreResult<SyncResult> {
        let key = graph.isolation_key().clone();
        let _guard = self.begin_sync(&key)?;
        info!(isolation_key = %key, nodes = graph.node_count(), edges = graph.edges.len(), "Starting graph sync");

        let mut result = SyncResult::default();
        let nodes = graph.nodes();

        for (seq, node) in nodes.iter().enumerate() {
            if self.bounded("upsert node", self.store.upsert_node(node, seq)).await? {
                result.nodes_created += 1;
            } else {
                result.nodes_updated += 1;
            }
        }

        for node in &nodes {
            for link in structural_links(node) {
                if self.bounded("upsert link", self.store.upsert_link(&key, &link)).await? {
                    result.links += 1;
                }
            }
        }

        for (seq, edge) in graph.edges.iter().enumerate() {
            if self.bounded("upsert edge", self.store.upsert_edge(edge, seq)).await? {
                result.relationships_created += 1;
            } else {
                result.relationships_updated += 1;
            }
        }

        info!(
            isolation_key = %key,
            nodes_created = result.nodes_created,
            nodes_updated = result.nodes_updated,
            relationships = result.relationships_created + result.relationships_updated,
            links = result.links,
            "Graph sync complete"
        );
        Ok(result)
    }

    /// Delete one folder's subgraph, or the whole store when `scope` is `None`.
    ///
    /// The unscoped form is destructive and unrecoverable. It is rejected with
    /// `DestructiveOperationMisuse` while any synchronization is in flight,
    /// before anything is deleted.
    pub async fn clear(&self, scope: Option<&IsolationKey>) -> StoreResult<usize> {
        let deleted = match scope {
            Some(key) => {
                if self.activity().clearing {
                    return Err(StoreError::ClearInProgress);
                }
                self.bounded("clear folder", self.store.delete_scope(Some(key))).await?
            }
            None => {
                let _guard = self.begin_full_clear()?;
                warn!("Clearing the entire graph store");
                self.bounded("clear store", self.store.delete_scope(None)).await?
            }
        };
        info!(
            scope = scope.map(|k| k.as_str()).unwrap_or("<all>"),
            deleted,
            "Graph cleared"
        );
        Ok(deleted)
    }

    pub async fn stats(&self, scope: Option<&IsolationKey>) -> StoreResult<StoreStats> {
        self.bounded("stats", self.store.stats(scope)).await
    }

    pub async fn export(&self, scope: Option<&IsolationKey>) -> StoreResult<ExportDocument> {
        self.bounded("export", self.store.fetch(scope)).await
    }

    pub async fn folders(&self) -> StoreResult<Vec<FolderNode>> {
        self.bounded("list folders", self.store.folders()).await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        within(self.timeout, operation, call).await
    }

    fn activity(&self) -> MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_sync(&self, key: &IsolationKey) -> StoreResult<SyncGuard<'_>> {
        let mut activity = self.activity();
        if activity.clearing {
            return Err(StoreError::ClearInProgress);
        }
        *activity.in_flight.entry(key.clone()).or_insert(0) += 1;
        Ok(SyncGuard {
            activity: &self.activity,
            key: key.clone(),
        })
    }

    fn begin_full_clear(&self) -> StoreResult<ClearGuard<'_>> {
        let mut activity = self.activity();
        if activity.clearing {
            return Err(StoreError::ClearInProgress);
        }
        let in_flight = activity.in_flight();
        if in_flight > 0 {
            return Err(StoreError::DestructiveOperationMisuse { in_flight });
        }
        activity.clearing = true;
        Ok(ClearGuard {
            activity: &self.activity,
        })
    }
}

/// Releases an in-flight registration when the sync future finishes or is dropped.
struct SyncGuard<'a> {
    activity: &'a Mutex<Activity>,
    key: IsolationKey,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        let mut activity = self.activity.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(count) = activity.in_flight.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                activity.in_flight.remove(&self.key);
            }
        }
    }
}

struct ClearGuard<'a> {
    activity: &'a Mutex<Activity>,
}

impl Drop for ClearGuard<'_> {
    fn drop(&mut self) {
        self.activity
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clearing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGraphStore;

    #[test]
    fn test_sync_result_merge() {
        let mut total = SyncResult {
            nodes_created: 2,
            ..Default::default()
        };
        total.merge(&SyncResult {
            nodes_created: 1,
            nodes_updated: 4,
            relationships_created: 3,
            relationships_updated: 0,
            links: 5,
        });
        assert_eq!(total.nodes_created, 3);
        assert_eq!(total.nodes_updated, 4);
        assert_eq!(total.links, 5);
    }

    #[test]
    fn test_full_clear_rejected_while_sync_registered() {
        let sync = GraphSynchronizer::new(MemoryGraphStore::new());
        let guard = sync.begin_sync(&IsolationKey::new("A")).unwrap();
        assert_eq!(sync.in_flight(), 1);
        assert!(matches!(
            sync.begin_full_clear(),
            Err(StoreError::DestructiveOperationMisuse { in_flight: 1 })
        ));
        drop(guard);
        assert_eq!(sync.in_flight(), 0);
        assert!(sync.begin_full_clear().is_ok());
    }

    #[test]
    fn test_sync_rejected_during_full_clear() {
        let sync = GraphSynchronizer::new(MemoryGraphStore::new());
        let clear = sync.begin_full_clear().unwrap();
        assert!(matches!(
            sync.begin_sync(&IsolationKey::new("A")),
            Err(StoreError::ClearInProgress)
        ));
        drop(clear);
        assert!(sync.begin_sync(&IsolationKey::new("A")).is_ok());
    }
}
