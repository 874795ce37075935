//! Document store abstraction.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::document::{Document, Lookup, Revision, StoredDocument};
use crate::error::{StoreError, StoreResult};

/// A schemaless document store with per-document optimistic concurrency.
///
/// Implementations own connection pooling, authentication and retry
/// policy. The engine only relies on the contract below.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Lists every database name.
    async fn list_databases(&self) -> StoreResult<BTreeSet<String>>;

    /// Creates a database. An existing database may be reported either as
    /// success or as [`StoreError::DatabaseExists`].
    async fn create_database(&self, name: &str) -> StoreResult<()>;

    /// Reads a document and its current revision.
    async fn get_document(&self, database: &str, id: &str) -> StoreResult<Lookup>;

    /// Writes a whole document.
    ///
    /// Fails with [`StoreError::Conflict`] if `revision` is not the
    /// document's current token (or is `None` for an existing document).
    async fn put_document(
        &self,
        database: &str,
        id: &str,
        revision: Option<&Revision>,
        document: &Document,
    ) -> StoreResult<Revision>;
}

#[derive(Debug, Clone)]
struct Entry {
    body: Document,
    generation: u64,
    revision: Revision,
}

/// An in-memory store with CouchDB-style revision semantics, for testing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: RwLock<BTreeMap<String, BTreeMap<String, Entry>>>,
    writes: AtomicU64,
    creates: AtomicU64,
    next_token: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with the given databases already present.
    pub fn with_databases<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut dbs = store.databases.write();
            for name in names {
                dbs.entry(name.into()).or_default();
            }
        }
        store
    }

    /// Number of successful document writes.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of databases created through [`DocumentStore::create_database`].
    pub fn create_count(&self) -> u64 {
        self.creates.load(Ordering::SeqCst)
    }

    /// Returns a document body, if present.
    pub fn document(&self, database: &str, id: &str) -> Option<Document> {
        self.databases
            .read()
            .get(database)
            .and_then(|db| db.get(id))
            .map(|entry| entry.body.clone())
    }

    /// Returns the number of documents in a database.
    pub fn document_count(&self, database: &str) -> usize {
        self.databases.read().get(database).map_or(0, |db| db.len())
    }

    /// Returns every database name.
    pub fn database_names(&self) -> BTreeSet<String> {
        self.databases.read().keys().cloned().collect()
    }

    /// Overwrites a document as an outside editor would, bumping its revision.
    /// Does not count towards [`write_count`](Self::write_count).
    pub fn edit_externally(&self, database: &str, id: &str, body: Document) {
        let mut dbs = self.databases.write();
        let db = dbs.entry(database.to_owned()).or_default();
        let generation = db.get(id).map_or(1, |e| e.generation + 1);
        let revision = self.mint(generation);
        db.insert(
            id.to_owned(),
            Entry {
                body,
                generation,
                revision,
            },
        );
    }

    fn mint(&self, generation: u64) -> Revision {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        Revision::new(format!("{generation}-{token:08x}"))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_databases(&self) -> StoreResult<BTreeSet<String>> {
        Ok(self.database_names())
    }

    async fn create_database(&self, name: &str) -> StoreResult<()> {
        let mut dbs = self.databases.write();
        if !dbs.contains_key(name) {
            dbs.insert(name.to_owned(), BTreeMap::new());
            self.creates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn get_document(&self, database: &str, id: &str) -> StoreResult<Lookup> {
        let dbs = self.databases.read();
        let db = dbs
            .get(database)
            .ok_or_else(|| StoreError::MissingDatabase(database.to_owned()))?;
        Ok(match db.get(id) {
            Some(entry) => Lookup::Found(StoredDocument {
                body: entry.body.clone(),
                revision: entry.revision.clone(),
            }),
            None => Lookup::NotFound,
        })
    }

    async fn put_document(
        &self,
        database: &str,
        id: &str,
        revision: Option<&Revision>,
        document: &Document,
    ) -> StoreResult<Revision> {
        let mut dbs = self.databases.write();
        let db = dbs
            .get_mut(database)
            .ok_or_else(|| StoreError::MissingDatabase(database.to_owned()))?;

        let current = db.get(id);
        let fresh = match (current, revision) {
            (None, None) => true,
            (Some(entry), Some(rev)) => &entry.revision == rev,
            _ => false,
        };
        if !fresh {
            return Err(StoreError::Conflict {
                database: database.to_owned(),
                id: id.to_owned(),
            });
        }

        let generation = current.map_or(1, |e| e.generation + 1);
        let revision = self.mint(generation);
        db.insert(
            id.to_owned(),
            Entry {
                body: document.clone(),
                generation,
                revision: revision.clone(),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(revision)
    }
}
