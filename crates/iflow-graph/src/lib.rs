//! # iFlow Graph
//!
//! Persists assembled iFlow knowledge graphs to Neo4j.
//!
//! Provides idempotent, isolation-key scoped upserts, scoped clear and
//! statistics, and store-side export.

pub mod client;
pub mod error;
pub mod schema;
pub mod store;
pub mod sync;

pub use client::{GraphClient, GraphConfig};
pub use error::{StoreError, StoreResult};
pub use store::{GraphStore, MemoryGraphStore, Neo4jGraphStore, StoreStats};
pub use sync::{GraphSynchronizer, SyncResult};
