//! Merge-patch upsert of single entities.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::document::{merge_patch, Document};
use crate::error::StoreResult;
use crate::store::DocumentStore;

/// What a single sync did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The document did not exist and was written.
    Created,
    /// The document existed and at least one patched field changed.
    Updated,
    /// The merged document equals the stored one; nothing was written.
    Unchanged,
}

/// Running totals of sync outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    /// Documents created.
    pub created: u64,
    /// Documents updated.
    pub updated: u64,
    /// Documents left untouched.
    pub unchanged: u64,
}

impl SyncCounts {
    /// Number of store writes performed.
    pub fn writes(&self) -> u64 {
        self.created + self.updated
    }
}

/// Idempotent, optimistic-concurrency-safe upserts.
///
/// This is the only write path into the store. It never overwrites blindly:
/// fields present only in the stored document survive, and a write racing
/// an external editor fails with a revision conflict instead of retrying.
pub struct DocumentSynchronizer<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    created: AtomicU64,
    updated: AtomicU64,
    unchanged: AtomicU64,
}

impl<S: DocumentStore + ?Sized> DocumentSynchronizer<S> {
    /// Creates a synchronizer over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            created: AtomicU64::new(0),
            updated: AtomicU64::new(0),
            unchanged: AtomicU64::new(0),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Totals since this synchronizer was created.
    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            created: self.created.load(Ordering::SeqCst),
            updated: self.updated.load(Ordering::SeqCst),
            unchanged: self.unchanged.load(Ordering::SeqCst),
        }
    }

    /// Merges `patch` into `database/id`.
    ///
    /// 1. Read the current document; a miss means an empty baseline.
    /// 2. Overlay every top-level key of `patch`.
    /// 3. Skip the write if nothing changed.
    /// 4. Otherwise write with the revision from step 1.
    pub async fn sync_entity(
        &self,
        database: &str,
        id: &str,
        patch: &Document,
    ) -> StoreResult<SyncOutcome> {
        let (baseline, revision) = self.store.get_document(database, id).await?.into_baseline();
        let merged = merge_patch(&baseline, patch);

        let outcome = if merged == baseline {
            SyncOutcome::Unchanged
        } else {
            self.store
                .put_document(database, id, revision.as_ref(), &merged)
                .await?;
            if revision.is_some() {
                SyncOutcome::Updated
            } else {
                SyncOutcome::Created
            }
        };

        let counter = match outcome {
            SyncOutcome::Created => &self.created,
            SyncOutcome::Updated => &self.updated,
            SyncOutcome::Unchanged => &self.unchanged,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        debug!(database, id, ?outcome, "synced entity");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Lookup, Revision};
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::BTreeSet;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, DocumentSynchronizer<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_databases(["foo"]));
        let sync = DocumentSynchronizer::new(Arc::clone(&store));
        (store, sync)
    }

    #[tokio::test]
    async fn repeated_sync_writes_once() {
        let (store, sync) = setup();
        let patch = doc(json!({"hash": 5, "x": 1}));

        assert_eq!(sync.sync_entity("foo", "5", &patch).await.unwrap(), SyncOutcome::Created);
        assert_eq!(sync.sync_entity("foo", "5", &patch).await.unwrap(), SyncOutcome::Unchanged);
        assert_eq!(store.write_count(), 1);
        assert_eq!(
            sync.counts(),
            SyncCounts {
                created: 1,
                updated: 0,
                unchanged: 1
            }
        );
    }

    #[tokio::test]
    async fn preserves_local_fields() {
        let (store, sync) = setup();
        store.edit_externally("foo", "1", doc(json!({"a": 1, "b": 2})));

        let outcome = sync
            .sync_entity("foo", "1", &doc(json!({"b": 3, "c": 4})))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Updated);
        assert_eq!(
            store.document("foo", "1").unwrap(),
            doc(json!({"a": 1, "b": 3, "c": 4}))
        );
    }

    #[tokio::test]
    async fn subset_patch_is_unchanged() {
        let (store, sync) = setup();
        store.edit_externally("foo", "1", doc(json!({"a": 1, "note": "local"})));

        let outcome = sync.sync_entity("foo", "1", &doc(json!({"a": 1}))).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn empty_patch_on_missing_document_writes_nothing() {
        let (store, sync) = setup();
        let outcome = sync.sync_entity("foo", "9", &Document::new()).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert!(store.document("foo", "9").is_none());
    }

    /// Lets an external editor bump the revision between our read and write.
    struct RacingStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl DocumentStore for RacingStore {
        async fn list_databases(&self) -> StoreResult<BTreeSet<String>> {
            self.inner.list_databases().await
        }

        async fn create_database(&self, name: &str) -> StoreResult<()> {
            self.inner.create_database(name).await
        }

        async fn get_document(&self, database: &str, id: &str) -> StoreResult<Lookup> {
            let lookup = self.inner.get_document(database, id).await?;
            self.inner
                .edit_externally(database, id, doc(json!({"edited": "elsewhere"})));
            Ok(lookup)
        }

        async fn put_document(
            &self,
            database: &str,
            id: &str,
            revision: Option<&Revision>,
            document: &Document,
        ) -> StoreResult<Revision> {
            self.inner.put_document(database, id, revision, document).await
        }
    }

    #[tokio::test]
    async fn stale_revision_is_a_conflict() {
        let inner = MemoryStore::with_databases(["foo"]);
        inner.edit_externally("foo", "1", doc(json!({"a": 1})));
        let store = Arc::new(RacingStore { inner });
        let sync = DocumentSynchronizer::new(Arc::clone(&store));

        let err = sync
            .sync_entity("foo", "1", &doc(json!({"a": 2})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref database, ref id } if database == "foo" && id == "1"));
        assert_eq!(
            store.inner.document("foo", "1").unwrap(),
            doc(json!({"edited": "elsewhere"}))
        );
        assert_eq!(store.inner.write_count(), 0);
    }

    #[tokio::test]
    async fn missing_database_propagates() {
        let (_store, sync) = setup();
        let err = sync
            .sync_entity("bar", "1", &doc(json!({"a": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingDatabase(_)));
    }
}
