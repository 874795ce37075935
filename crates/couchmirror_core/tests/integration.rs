//! End-to-end tests for world and asset synchronization.

use couchmirror_core::{
    ArchiveOpener, AssetPipeline, AssetSteps, DocRef, Document, DocumentSynchronizer,
    IntegrityViolation, JsonArchiveOpener, ManifestDescriptor, ManifestWalker, MemoryCatalog,
    MemoryStore, MirrorConfig, NameTransform, SyncError, SyncResult, TableReader,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::thread::ThreadId;

fn object(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn manifest() -> ManifestDescriptor {
    ManifestDescriptor::from_value(json!({
        "version": "228321.24.05.14",
        "jsonWorldContentPaths": {"en": "/world/en.json"},
        "mobileGearAssetDataBases": [
            {"version": 1, "path": "/gear/v1.content"},
            {"version": 2, "path": "/common/gear/v2.content"}
        ],
        "mobileGearCDN": {"Gear": "/geometry/gear/", "Texture": "/geometry/textures"}
    }))
    .unwrap()
}

struct Harness {
    store: Arc<MemoryStore>,
    catalog: MemoryCatalog,
    names: NameTransform,
    sync: DocumentSynchronizer<MemoryStore>,
    config: MirrorConfig,
    _scratch: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let scratch = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::new();
        catalog.set_manifest(manifest());
        Self {
            sync: DocumentSynchronizer::new(Arc::clone(&store)),
            store,
            catalog,
            names: NameTransform::default(),
            config: MirrorConfig::new()
                .with_scratch_dir(scratch.path())
                .with_gear_fetch_concurrency(3),
            _scratch: scratch,
        }
    }

    fn pipeline(&self) -> AssetPipeline<'_, MemoryStore, MemoryCatalog> {
        AssetPipeline::new(
            &self.config,
            &self.sync,
            &self.catalog,
            Arc::new(JsonArchiveOpener),
        )
    }

    fn index_gear(&self, index: Value) {
        self.store
            .edit_externally("meta", "gear_assets", object(index));
    }
}

#[tokio::test]
async fn world_sync_end_to_end() {
    let h = Harness::new();
    h.catalog.insert_json(
        "/world/en.json",
        json!({"DestinyFooDefinition": {"5": {"hash": 5, "x": 1}}}),
    );

    let walker = ManifestWalker::new(&h.names, &h.sync);
    let manifest = h.catalog_manifest().await;

    let report = walker.sync_from_catalog(&h.catalog, &manifest, "en").await.unwrap();
    assert_eq!(report.databases_created, vec!["foo"]);
    assert_eq!(report.counts.writes(), 1);
    assert_eq!(h.store.document("foo", "5").unwrap(), object(json!({"hash": 5, "x": 1})));

    let report = walker.sync_from_catalog(&h.catalog, &manifest, "en").await.unwrap();
    assert!(report.databases_created.is_empty());
    assert_eq!(report.counts.writes(), 0);
    assert_eq!(report.counts.unchanged, 1);
    assert_eq!(h.store.write_count(), 1);
    assert_eq!(h.store.create_count(), 1);
}

impl Harness {
    async fn catalog_manifest(&self) -> ManifestDescriptor {
        use couchmirror_core::CatalogClient;
        self.catalog.fetch_manifest_descriptor().await.unwrap()
    }
}

#[tokio::test]
async fn world_sync_preserves_local_annotations() {
    let h = Harness::new();
    let walker = ManifestWalker::new(&h.names, &h.sync);
    let world = object(json!({"DestinyStatDefinition": {"7": {"hash": 7, "name": "Power"}}}));

    walker.sync_world(world).await.unwrap();
    let mut annotated = h.store.document("stat", "7").unwrap();
    annotated.insert("curator_note".into(), json!("keep me"));
    h.store.edit_externally("stat", "7", annotated);

    let world = object(json!({"DestinyStatDefinition": {"7": {"hash": 7, "name": "Light"}}}));
    let report = walker.sync_world(world).await.unwrap();
    assert_eq!(report.counts.updated, 1);
    assert_eq!(
        h.store.document("stat", "7").unwrap(),
        object(json!({"hash": 7, "name": "Light", "curator_note": "keep me"}))
    );
}

#[tokio::test]
async fn gear_sync_deduplicates_dyes() {
    let h = Harness::new();
    h.index_gear(json!({
        "100": {"gear": ["a.js", "shared.js"], "content": []},
        "200": {"gear": ["shared.js", "b.js"]},
        "300": {}
    }));
    let dye = json!({"hash": 42, "channel": 1, "material": "chrome"});
    h.catalog.insert_json(
        "/geometry/gear/a.js",
        json!({"default_dyes": [dye.clone()], "locked_dyes": [], "custom_dyes": []}),
    );
    h.catalog.insert_json(
        "/geometry/gear/b.js",
        json!({"default_dyes": [], "locked_dyes": [dye.clone()], "custom_dyes": [{"hash": 43}]}),
    );
    h.catalog.insert_json("/geometry/gear/shared.js", json!({"custom_dyes": [dye]}));

    let report = h.pipeline().sync_gear(&manifest()).await.unwrap();
    assert_eq!(report.indexed_items, 3);
    assert_eq!(report.files, 3);
    assert_eq!(report.dyes, 2);
    assert_eq!(report.dye_occurrences, 4);

    // Shared file fetched once
    let shared = h
        .catalog
        .fetched()
        .iter()
        .filter(|p| p.ends_with("shared.js"))
        .count();
    assert_eq!(shared, 1);

    assert_eq!(h.store.document("gear", "a").unwrap()["hash"], json!("a"));
    assert_eq!(h.store.document_count("gear"), 3);
    assert_eq!(h.store.document_count("dye_manifest"), 2);
    assert_eq!(
        h.store.document("dye_manifest", "42").unwrap(),
        object(json!({"hash": 42, "channel": 1, "material": "chrome"}))
    );

    // Re-running converges without writes
    let writes = h.store.write_count();
    h.pipeline().sync_gear(&manifest()).await.unwrap();
    assert_eq!(h.store.write_count(), writes);
}

#[tokio::test]
async fn divergent_dye_aborts_before_dye_writes() {
    let h = Harness::new();
    h.index_gear(json!({"1": {"gear": ["a.js", "b.js"]}}));
    h.catalog.insert_json(
        "/geometry/gear/a.js",
        json!({"default_dyes": [{"hash": 9, "material": "gold"}]}),
    );
    h.catalog.insert_json(
        "/geometry/gear/b.js",
        json!({"default_dyes": [{"hash": 9, "material": "silver"}]}),
    );

    let err = h.pipeline().sync_gear(&manifest()).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Integrity(IntegrityViolation::DivergentDye { ref hash, .. }) if hash == "9"
    ));
    assert_eq!(h.store.document_count("dye_manifest"), 0);
}

#[tokio::test]
async fn missing_gear_file_is_fatal() {
    let h = Harness::new();
    h.index_gear(json!({"1": {"gear": ["gone.js"]}}));
    let err = h.pipeline().sync_gear(&manifest()).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Catalog(couchmirror_core::CatalogError::NotFound(_))
    ));
}

#[tokio::test]
async fn missing_gear_index_fetches_nothing() {
    let h = Harness::new();
    let report = h.pipeline().sync_gear(&manifest()).await.unwrap();
    assert_eq!(report.files, 0);
    assert!(h.catalog.fetched().is_empty());
}

#[tokio::test]
async fn metadata_documents() {
    let h = Harness::new();
    h.pipeline().sync_metadata(&manifest()).await.unwrap();

    assert_eq!(
        h.store.document("meta", "world").unwrap(),
        object(json!({"version": "228321.24.05.14"}))
    );
    assert_eq!(
        h.store.document("meta", "gear_cdn").unwrap(),
        object(json!({"Gear": "/geometry/gear/", "Texture": "/geometry/textures"}))
    );
}

#[tokio::test]
async fn snapshot_rows_are_hash_tagged_but_not_written() {
    let h = Harness::new();
    h.catalog.insert_bytes(
        "/common/gear/v2.content",
        serde_json::to_vec(&json!({
            "DestinyGearAssetsDefinition": {
                "-1": {"gear": ["a.js"]},
                "12": {"gear": []}
            },
            "DestinyDyeDefinition": {"3": {"name": "x"}}
        }))
        .unwrap(),
    );

    let mut seen = Vec::new();
    let report = h
        .pipeline()
        .ingest_snapshot(&manifest(), |table, row| {
            seen.push((table.to_owned(), row["hash"].clone()));
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(report.rows(), 3);
    assert_eq!(report.tables["DestinyGearAssetsDefinition"], 2);
    assert!(report.bytes > 0);
    assert!(seen.contains(&("DestinyGearAssetsDefinition".to_owned(), json!(-1))));
    assert!(seen.contains(&("DestinyDyeDefinition".to_owned(), json!(3))));

    let full = h
        .pipeline()
        .run(
            &manifest(),
            AssetSteps {
                snapshot: true,
                metadata: false,
                gear: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(full.snapshot.unwrap().rows(), 3);
    assert_eq!(h.store.write_count(), 0);
}

/// Records which thread unpacked the archive.
#[derive(Default)]
struct ThreadRecordingOpener {
    thread: Mutex<Option<ThreadId>>,
}

impl ArchiveOpener for ThreadRecordingOpener {
    fn open(&self, archive: &Path, scratch: &Path) -> SyncResult<Box<dyn TableReader>> {
        *self.thread.lock() = Some(std::thread::current().id());
        JsonArchiveOpener.open(archive, scratch)
    }
}

#[tokio::test]
async fn snapshot_is_read_off_the_runtime_thread() {
    let h = Harness::new();
    let mut rows = serde_json::Map::new();
    for id in 0..1000 {
        rows.insert(id.to_string(), json!({"n": id}));
    }
    h.catalog.insert_bytes(
        "/common/gear/v2.content",
        serde_json::to_vec(&json!({"Big": rows, "Empty": {}})).unwrap(),
    );

    let opener = Arc::new(ThreadRecordingOpener::default());
    let pipeline = AssetPipeline::new(&h.config, &h.sync, &h.catalog, opener.clone());
    let mut count = 0;
    let report = pipeline
        .ingest_snapshot(&manifest(), |_, _| {
            count += 1;
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(count, 1000);
    assert_eq!(report.tables["Big"], 1000);
    assert_eq!(report.tables["Empty"], 0);
    let reader_thread = opener.thread.lock().unwrap();
    assert_ne!(reader_thread, std::thread::current().id());
}

#[tokio::test]
async fn visitor_error_stops_ingestion() {
    let h = Harness::new();
    let mut rows = serde_json::Map::new();
    for id in 0..1000 {
        rows.insert(id.to_string(), json!({"n": id}));
    }
    h.catalog.insert_bytes(
        "/common/gear/v2.content",
        serde_json::to_vec(&json!({ "Big": rows })).unwrap(),
    );

    let mut seen = 0;
    let err = h
        .pipeline()
        .ingest_snapshot(&manifest(), |table, _| {
            seen += 1;
            if seen == 10 {
                return Err(SyncError::Archive(format!("{table}: rejected")));
            }
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Archive(msg) if msg == "Big: rejected"));
    assert_eq!(seen, 10);
}

#[tokio::test]
async fn snapshot_version_must_be_published() {
    let mut h = Harness::new();
    h.config = h.config.clone().with_snapshot_version(7);
    let err = h
        .pipeline()
        .ingest_snapshot(&manifest(), |_, _| Ok(()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Integrity(IntegrityViolation::MissingSnapshotVersion { version: 7 })
    ));
}

#[tokio::test]
async fn full_asset_run_with_custom_index_location() {
    let mut h = Harness::new();
    h.config = h
        .config
        .clone()
        .with_gear_index(DocRef::new("gear_assets", "index"));
    h.store.edit_externally(
        "gear_assets",
        "index",
        object(json!({"1": {"gear": ["a.js"]}})),
    );
    h.catalog
        .insert_json("/geometry/gear/a.js", json!({"default_dyes": [{"hash": 1}]}));
    h.catalog
        .insert_bytes("/common/gear/v2.content", br#"{"T": {"1": {}}}"#.to_vec());

    let report = h.pipeline().run(&manifest(), AssetSteps::all()).await.unwrap();
    assert!(report.metadata);
    assert_eq!(report.snapshot.unwrap().rows(), 1);
    assert_eq!(report.gear.unwrap().dyes, 1);
    assert!(h.store.document("dye_manifest", "1").is_some());
}
