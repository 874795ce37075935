//! Asset pipeline: relational snapshot ingestion, manifest metadata, gear
//! definitions and deduplicated dyes.
//!
//! Each step is idempotent and can be retried on its own. A run cut short
//! leaves every completed document committed and the rest untouched.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::CatalogClient;
use crate::config::MirrorConfig;
use crate::document::{as_array, as_object, as_str, into_object, Document, Lookup};
use crate::dyes::DyeSet;
use crate::error::{StoreError, SyncError, SyncResult};
use crate::manifest::ManifestDescriptor;
use crate::reconciler::ensure_databases;
use crate::snapshot::ArchiveOpener;
use crate::store::DocumentStore;
use crate::synchronizer::DocumentSynchronizer;

/// Id of the metadata document holding the manifest version.
pub const WORLD_META_ID: &str = "world";
/// Id of the metadata document holding the gear CDN path table.
pub const GEAR_CDN_META_ID: &str = "gear_cdn";

/// File name the snapshot archive is downloaded to inside the scratch directory.
pub const ARCHIVE_FILE: &str = "snapshot.zip";

/// Rows buffered between the snapshot reader thread and the row visitor.
const ROW_BUFFER: usize = 256;

/// Which steps of the pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetSteps {
    /// Download and read the relational snapshot.
    pub snapshot: bool,
    /// Write the well-known metadata documents.
    pub metadata: bool,
    /// Fetch gear definitions and deduplicate dyes.
    pub gear: bool,
}

impl AssetSteps {
    /// Every step.
    pub fn all() -> Self {
        Self {
            snapshot: true,
            metadata: true,
            gear: true,
        }
    }
}

impl Default for AssetSteps {
    fn default() -> Self {
        Self::all()
    }
}

/// Rows read from a relational snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Archive bytes downloaded.
    pub bytes: u64,
    /// Row count per table.
    pub tables: BTreeMap<String, usize>,
}

impl IngestReport {
    /// Total rows across all tables.
    pub fn rows(&self) -> usize {
        self.tables.values().sum()
    }
}

/// Outcome of a gear pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GearReport {
    /// Items listed in the gear asset index.
    pub indexed_items: usize,
    /// Distinct gear definition files fetched.
    pub files: usize,
    /// Distinct dyes written.
    pub dyes: usize,
    /// Dye references seen, duplicates included.
    pub dye_occurrences: usize,
}

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetReport {
    /// Snapshot ingestion, if it ran.
    pub snapshot: Option<IngestReport>,
    /// Whether metadata documents were synchronized.
    pub metadata: bool,
    /// Gear pass, if it ran.
    pub gear: Option<GearReport>,
}

/// Downloads and synchronizes binary-published assets.
pub struct AssetPipeline<'a, S, C>
where
    S: DocumentStore + ?Sized,
    C: CatalogClient + ?Sized,
{
    config: &'a MirrorConfig,
    sync: &'a DocumentSynchronizer<S>,
    catalog: &'a C,
    opener: Arc<dyn ArchiveOpener>,
}

impl<'a, S, C> AssetPipeline<'a, S, C>
where
    S: DocumentStore + ?Sized,
    C: CatalogClient + ?Sized,
{
    /// Creates a pipeline.
    pub fn new(
        config: &'a MirrorConfig,
        sync: &'a DocumentSynchronizer<S>,
        catalog: &'a C,
        opener: Arc<dyn ArchiveOpener>,
    ) -> Self {
        Self {
            config,
            sync,
            catalog,
            opener,
        }
    }

    /// Runs the selected steps in order: snapshot, metadata, gear.
    pub async fn run(
        &self,
        manifest: &ManifestDescriptor,
        steps: AssetSteps,
    ) -> SyncResult<AssetReport> {
        let mut report = AssetReport::default();

        if steps.snapshot {
            // Raw table rows are hash-tagged but not persisted.
            let ingest = self.ingest_snapshot(manifest, |_table, _row| Ok(())).await?;
            report.snapshot = Some(ingest);
        }
        if steps.metadata {
            self.sync_metadata(manifest).await?;
            report.metadata = true;
        }
        if steps.gear {
            report.gear = Some(self.sync_gear(manifest).await?);
        }

        Ok(report)
    }

    /// Downloads the snapshot with the configured format version, unpacks it
    /// into a scratch directory, and hands every row to `visit` with its
    /// signed 32-bit id attached as `hash`.
    pub async fn ingest_snapshot<F>(
        &self,
        manifest: &ManifestDescriptor,
        mut visit: F,
    ) -> SyncResult<IngestReport>
    where
        F: FnMut(&str, Document) -> SyncResult<()>,
    {
        let descriptor = manifest.snapshot(self.config.snapshot_version)?;
        let scratch = match &self.config.scratch_dir {
            Some(dir) => tempfile::Builder::new().prefix("couchmirror-").tempdir_in(dir)?,
            None => tempfile::Builder::new().prefix("couchmirror-").tempdir()?,
        };

        let archive = scratch.path().join(ARCHIVE_FILE);

        info!(path = %descriptor.path, version = descriptor.version, "downloading snapshot");
        let bytes = self.download(&descriptor.path, &archive).await?;
        let mut report = IngestReport {
            bytes,
            ..IngestReport::default()
        };

        // Unpacking and table reads block; they run off the runtime and feed
        // rows back through a bounded channel.
        let (tx, mut rx) = mpsc::channel(ROW_BUFFER);
        let opener = Arc::clone(&self.opener);
        let dir = scratch.path().to_owned();
        let reader =
            tokio::task::spawn_blocking(move || read_snapshot(&*opener, &archive, &dir, &tx));

        let mut visited = Ok(());
        let mut current = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                SnapshotEvent::Table(table) => {
                    report.tables.insert(table.clone(), 0);
                    current = table;
                }
                SnapshotEvent::Row(row) => {
                    if let Err(e) = visit(&current, row) {
                        visited = Err(e);
                        break;
                    }
                    *report.tables.entry(current.clone()).or_default() += 1;
                }
            }
        }
        // Unblocks the reader if the visitor stopped early.
        drop(rx);

        let read = reader
            .await
            .map_err(|e| SyncError::Archive(format!("snapshot reader failed: {e}")))?;
        visited?;
        read?;

        info!(tables = report.tables.len(), rows = report.rows(), "snapshot ingested");
        Ok(report)
    }

    async fn download(&self, path: &str, dest: &Path) -> SyncResult<u64> {
        let mut body = self.catalog.fetch_bytes(path).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.try_next().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Writes the manifest version and the gear CDN path table to the
    /// well-known metadata documents.
    pub async fn sync_metadata(&self, manifest: &ManifestDescriptor) -> SyncResult<()> {
        let meta = &self.config.meta_database;
        ensure_databases(self.store(), &BTreeSet::from([meta.clone()])).await?;

        let mut world = Document::new();
        world.insert("version".into(), Value::from(manifest.version.clone()));
        self.sync.sync_entity(meta, WORLD_META_ID, &world).await?;

        let cdn: Document = manifest
            .mobile_gear_cdn
            .iter()
            .map(|(kind, path)| (kind.clone(), Value::from(path.clone())))
            .collect();
        self.sync.sync_entity(meta, GEAR_CDN_META_ID, &cdn).await?;

        info!(version = %manifest.version, "manifest metadata synced");
        Ok(())
    }

    /// Fetches every gear definition named by the gear asset index, writes
    /// them to the gear database, then writes each distinct dye once.
    pub async fn sync_gear(&self, manifest: &ManifestDescriptor) -> SyncResult<GearReport> {
        let gear_db = &self.config.gear_database;
        let dye_db = &self.config.dye_database;
        ensure_databases(self.store(), &BTreeSet::from([gear_db.clone(), dye_db.clone()]))
            .await?;

        let (indexed_items, files) = self.gear_files().await?;
        let prefix = manifest.gear_cdn_prefix()?.trim_end_matches('/').to_owned();
        info!(items = indexed_items, files = files.len(), "syncing gear definitions");

        // Fetches overlap; definitions are consumed one at a time, in order,
        // so the dye set has a single owner.
        let catalog = self.catalog;
        let fetched = stream::iter(files.iter())
            .map(|file| {
                let url = format!("{prefix}/{file}");
                async move { catalog.fetch_json(&url).await.map(|body| (file, body)) }
            })
            .buffered(self.config.gear_fetch_concurrency.max(1));
        tokio::pin!(fetched);

        let mut dyes = DyeSet::new();
        let mut report = GearReport {
            indexed_items,
            ..GearReport::default()
        };

        while let Some((file, body)) = fetched.try_next().await? {
            let id = gear_id(file);
            let mut gear = into_object(body, file)?;
            dyes.observe(file, &gear)?;
            gear.insert("hash".into(), Value::from(id));
            self.sync.sync_entity(gear_db, id, &gear).await?;
            report.files += 1;
        }

        report.dye_occurrences = dyes.occurrences();
        for (hash, dye) in dyes.into_records() {
            self.sync.sync_entity(dye_db, &hash, &dye).await?;
            report.dyes += 1;
        }

        info!(
            files = report.files,
            dyes = report.dyes,
            dye_occurrences = report.dye_occurrences,
            "gear sync complete"
        );
        Ok(report)
    }

    /// Reads the gear asset index and returns the item count and the union of
    /// referenced definition files.
    async fn gear_files(&self) -> SyncResult<(usize, BTreeSet<String>)> {
        let index = &self.config.gear_index;
        let body = match self.store().get_document(&index.database, &index.id).await {
            Ok(Lookup::Found(doc)) => doc.body,
            Ok(Lookup::NotFound) | Err(StoreError::MissingDatabase(_)) => {
                warn!(
                    database = %index.database,
                    id = %index.id,
                    "gear asset index not found; nothing to fetch"
                );
                return Ok((0, BTreeSet::new()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut items = 0;
        let mut files = BTreeSet::new();
        for (item, entry) in body.iter().filter(|(key, _)| !key.starts_with('_')) {
            let location = format!("{}.{item}", index.id);
            let entry = as_object(entry, &location)?;
            items += 1;
            let Some(gear) = entry.get("gear") else {
                continue;
            };
            for file in as_array(gear, &format!("{location}.gear"))? {
                files.insert(as_str(file, &format!("{location}.gear[]"))?.to_owned());
            }
        }
        Ok((items, files))
    }

    fn store(&self) -> &S {
        self.sync.store().as_ref()
    }
}

enum SnapshotEvent {
    Table(String),
    Row(Document),
}

/// Opens the archive and streams its tables to `tx`. Stops quietly once the
/// receiving side is gone.
fn read_snapshot(
    opener: &dyn ArchiveOpener,
    archive: &Path,
    scratch: &Path,
    tx: &mpsc::Sender<SnapshotEvent>,
) -> SyncResult<()> {
    let reader = opener.open(archive, scratch)?;
    for table in reader.list_tables()? {
        if tx.blocking_send(SnapshotEvent::Table(table.clone())).is_err() {
            return Ok(());
        }
        let mut rows = 0usize;
        for row in reader.read_table(&table)? {
            let (id, row) = row?;
            let mut row = into_object(row, &format!("{table}[{id}]"))?;
            row.insert("hash".into(), Value::from(id));
            if tx.blocking_send(SnapshotEvent::Row(row)).is_err() {
                return Ok(());
            }
            rows += 1;
        }
        debug!(table = %table, rows, "read snapshot table");
    }
    Ok(())
}

/// Entity id of a gear definition file: its name without the extension.
pub fn gear_id(file: &str) -> &str {
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gear_ids() {
        assert_eq!(gear_id("0a1b2c.js"), "0a1b2c");
        assert_eq!(gear_id("archive.tar.gz"), "archive.tar");
        assert_eq!(gear_id("noext"), "noext");
        assert_eq!(gear_id(".hidden"), ".hidden");
    }

    #[test]
    fn default_steps() {
        assert_eq!(AssetSteps::default(), AssetSteps::all());
        assert!(AssetSteps::all().snapshot);
    }
}
