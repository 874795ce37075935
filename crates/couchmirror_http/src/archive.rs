//! Zip-packed SQLite snapshot reader.

use couchmirror_core::{ArchiveOpener, Row, RowIter, SyncError, SyncResult, TableReader};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Opens snapshot archives: a zip with exactly one member, itself a SQLite
/// database whose tables hold `(id INTEGER, json TEXT|BLOB)` rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipSqliteOpener;

impl ArchiveOpener for ZipSqliteOpener {
    fn open(&self, archive: &Path, scratch: &Path) -> SyncResult<Box<dyn TableReader>> {
        let database = extract_single_member(archive, scratch)?;
        Ok(Box::new(SqliteTables::open(&database)?))
    }
}

/// Directory under the scratch root that receives the extracted member.
///
/// The member usually carries the same file name as the downloaded archive,
/// so it must never be written next to it.
pub const EXTRACT_DIR: &str = "extracted";

/// Rows fetched from SQLite per query while iterating a table.
pub const ROW_PAGE: i64 = 256;

/// Extracts the only member of `archive` into `scratch/extracted/` and
/// returns its path.
pub fn extract_single_member(archive: &Path, scratch: &Path) -> SyncResult<PathBuf> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?).map_err(archive_error)?;
    if zip.len() != 1 {
        return Err(SyncError::Archive(format!(
            "expected exactly one member in {}, found {}",
            archive.display(),
            zip.len()
        )));
    }

    let mut member = zip.by_index(0).map_err(archive_error)?;
    let name = member
        .enclosed_name()
        .and_then(|p| p.file_name().map(|n| n.to_owned()))
        .ok_or_else(|| SyncError::Archive(format!("unsafe member name {:?}", member.name())))?;

    let dir = scratch.join(EXTRACT_DIR);
    std::fs::create_dir_all(&dir)?;
    let dest = dir.join(name);
    let mut out = File::create(&dest)?;
    let bytes = std::io::copy(&mut member, &mut out)?;
    debug!(member = %dest.display(), bytes, "extracted snapshot member");
    Ok(dest)
}

/// Table reader over a SQLite database file.
pub struct SqliteTables {
    conn: Connection,
}

impl SqliteTables {
    /// Opens the database read-only.
    pub fn open(path: &Path) -> SyncResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(sqlite_error)?;
        Ok(Self { conn })
    }
}

impl TableReader for SqliteTables {
    fn list_tables(&self) -> SyncResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(sqlite_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sqlite_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sqlite_error)?;
        Ok(names)
    }

    fn read_table(&self, name: &str) -> SyncResult<RowIter<'_>> {
        Ok(Box::new(TableRows::new(&self.conn, name)))
    }
}

/// Lazy row iterator: fetches [`ROW_PAGE`] rows at a time in rowid order.
struct TableRows<'a> {
    conn: &'a Connection,
    table: String,
    sql: String,
    after: i64,
    page: std::vec::IntoIter<SyncResult<Row>>,
    done: bool,
}

impl<'a> TableRows<'a> {
    fn new(conn: &'a Connection, table: &str) -> Self {
        Self {
            conn,
            table: table.to_owned(),
            sql: format!(
                "SELECT rowid, id, json FROM {} WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
                quote_identifier(table)
            ),
            after: i64::MIN,
            page: Vec::new().into_iter(),
            done: false,
        }
    }

    fn fetch_page(&mut self) -> SyncResult<Vec<SyncResult<Row>>> {
        let mut stmt = self.conn.prepare_cached(&self.sql).map_err(sqlite_error)?;
        let raw = stmt
            .query_map(rusqlite::params![self.after, ROW_PAGE], |row| {
                let rowid: i64 = row.get(0)?;
                let id: i64 = row.get(1)?;
                let json = match row.get_ref(2)? {
                    ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes.to_vec(),
                    _ => Vec::new(),
                };
                Ok((rowid, id, json))
            })
            .map_err(sqlite_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sqlite_error)?;

        if raw.len() < ROW_PAGE as usize {
            self.done = true;
        }
        if let Some((rowid, _, _)) = raw.last() {
            self.after = *rowid;
        }
        Ok(raw
            .into_iter()
            .map(|(_, id, json)| decode_row(&self.table, (id, json)))
            .collect())
    }
}

impl Iterator for TableRows<'_> {
    type Item = SyncResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.page.next() {
            return Some(row);
        }
        if self.done {
            return None;
        }
        match self.fetch_page() {
            Ok(page) => {
                self.page = page.into_iter();
                self.page.next()
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn decode_row(table: &str, (id, json): (i64, Vec<u8>)) -> SyncResult<Row> {
    // Ids are stored as the unsigned bit pattern of a signed 32-bit hash.
    let id = i32::try_from(id)
        .or_else(|_| u32::try_from(id).map(|unsigned| unsigned as i32))
        .map_err(|_| SyncError::Archive(format!("{table}: id {id} is not a 32-bit hash")))?;
    let row: Value = serde_json::from_slice(&json)
        .map_err(|e| SyncError::Archive(format!("{table}[{id}]: {e}")))?;
    Ok((id, row))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn archive_error(e: zip::result::ZipError) -> SyncError {
    SyncError::Archive(e.to_string())
}

fn sqlite_error(e: rusqlite::Error) -> SyncError {
    SyncError::Archive(e.to_string())
}
