//! Relational snapshot capabilities.
//!
//! Unpacking the archive and reading its tables is delegated to an
//! [`ArchiveOpener`]; the engine only iterates `(id, row)` pairs.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::document::{as_object, into_object};
use crate::error::{SyncError, SyncResult};

/// A table row: signed 32-bit id and JSON payload.
pub type Row = (i32, Value);

/// Row iterator over one table.
pub type RowIter<'a> = Box<dyn Iterator<Item = SyncResult<Row>> + 'a>;

/// Read access to the tables of an unpacked snapshot.
pub trait TableReader: Send {
    /// Names of every table in the snapshot.
    fn list_tables(&self) -> SyncResult<Vec<String>>;

    /// Iterates the rows of one table. Each call starts a fresh pass.
    fn read_table(&self, name: &str) -> SyncResult<RowIter<'_>>;
}

/// Unpacks a downloaded snapshot archive.
pub trait ArchiveOpener: Send + Sync {
    /// Unpacks `archive` into `scratch` and opens it for reading.
    ///
    /// Archives with other than exactly one inner member are rejected
    /// with [`SyncError::Archive`].
    fn open(&self, archive: &Path, scratch: &Path) -> SyncResult<Box<dyn TableReader>>;
}

/// In-memory tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    tables: BTreeMap<String, Vec<Row>>,
}

impl MemoryTables {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row to a table, creating the table if needed.
    pub fn insert(&mut self, table: impl Into<String>, id: i32, row: Value) {
        self.tables.entry(table.into()).or_default().push((id, row));
    }

    /// Parses `{"Table": {"<id>": {..row..}}}`.
    pub fn from_json(value: Value) -> SyncResult<Self> {
        let mut tables = Self::new();
        for (name, rows) in into_object(value, "snapshot")? {
            let location = format!("snapshot.{name}");
            for (id, row) in as_object(&rows, &location)? {
                let id: i32 = id
                    .parse()
                    .map_err(|_| SyncError::Archive(format!("{location}: bad row id {id:?}")))?;
                tables.insert(name.clone(), id, row.clone());
            }
        }
        Ok(tables)
    }
}

impl TableReader for MemoryTables {
    fn list_tables(&self) -> SyncResult<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn read_table(&self, name: &str) -> SyncResult<RowIter<'_>> {
        let rows = self
            .tables
            .get(name)
            .ok_or_else(|| SyncError::Archive(format!("no such table: {name}")))?;
        Ok(Box::new(rows.iter().cloned().map(Ok)))
    }
}

/// Opens archives whose single member is a JSON table dump, for testing.
#[derive(Debug, Default)]
pub struct JsonArchiveOpener;

impl ArchiveOpener for JsonArchiveOpener {
    fn open(&self, archive: &Path, _scratch: &Path) -> SyncResult<Box<dyn TableReader>> {
        let bytes = std::fs::read(archive)?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Archive(format!("{}: {e}", archive.display())))?;
        Ok(Box::new(MemoryTables::from_json(value)?))
    }
}
