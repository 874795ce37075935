//! # couchmirror core
//!
//! Manifest synchronization engine: mirrors catalog content into a
//! schemaless document store.
//!
//! This crate provides:
//! - Collection name to database name mapping ([`NameTransform`])
//! - Database existence reconciliation ([`ensure_databases`])
//! - Merge-patch upserts with optimistic concurrency ([`DocumentSynchronizer`])
//! - World content traversal ([`ManifestWalker`])
//! - Snapshot, metadata, gear and dye synchronization ([`AssetPipeline`])
//! - In-memory collaborators for tests ([`MemoryStore`], [`MemoryCatalog`],
//!   [`MemoryTables`])
//!
//! ## Key Invariants
//!
//! - Every write is a merge-patch upsert; fields added locally survive
//! - Re-running with unchanged input performs zero writes
//! - A stale revision is a conflict, never a blind overwrite
//! - A declared hash must equal its key
//! - Every copy of a dye hash must be byte-identical
//!
//! ## Example
//!
//! ```
//! use couchmirror_core::{DocumentSynchronizer, ManifestWalker, MemoryStore, NameTransform};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let sync = DocumentSynchronizer::new(Arc::clone(&store));
//! let names = NameTransform::default();
//!
//! let world = json!({"DestinyFooDefinition": {"5": {"hash": 5, "x": 1}}});
//! let walker = ManifestWalker::new(&names, &sync);
//! walker.sync_world(world.as_object().unwrap().clone()).await.unwrap();
//!
//! assert_eq!(store.document("foo", "5").unwrap()["x"], json!(1));
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod assets;
mod catalog;
mod config;
mod document;
mod dyes;
mod error;
mod manifest;
mod naming;
mod reconciler;
mod snapshot;
mod store;
mod synchronizer;
mod walker;

pub use assets::{
    gear_id, AssetPipeline, AssetReport, AssetSteps, GearReport, IngestReport, GEAR_CDN_META_ID,
    WORLD_META_ID,
};
pub use catalog::{ByteStream, CatalogClient, MemoryCatalog};
pub use config::{DocRef, MirrorConfig};
pub use document::{
    as_array, as_object, as_str, field, id_of, into_object, merge_patch, Document, Lookup,
    Revision, StoredDocument,
};
pub use dyes::{DyeSet, DYE_LISTS};
pub use error::{
    CatalogError, CatalogResult, IntegrityViolation, ShapeError, StoreError, StoreResult,
    SyncError, SyncResult,
};
pub use manifest::{unwrap_envelope, ManifestDescriptor, SnapshotDescriptor, WorldJson};
pub use naming::NameTransform;
pub use reconciler::ensure_databases;
pub use snapshot::{ArchiveOpener, JsonArchiveOpener, MemoryTables, Row, RowIter, TableReader};
pub use store::{DocumentStore, MemoryStore};
pub use synchronizer::{DocumentSynchronizer, SyncCounts, SyncOutcome};
pub use walker::{parse_hash_key, ManifestWalker, WalkReport};
