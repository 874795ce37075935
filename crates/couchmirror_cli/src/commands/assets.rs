//! Assets command implementation.

use couchmirror_core::{
    ArchiveOpener, AssetPipeline, AssetReport, AssetSteps, CatalogClient, DocumentStore,
    DocumentSynchronizer, ManifestDescriptor, MirrorConfig, SyncResult,
};
use std::sync::Arc;
use tracing::info;

/// Runs the selected asset pipeline steps.
pub async fn run<S, C>(
    sync: &DocumentSynchronizer<S>,
    catalog: &C,
    opener: Arc<dyn ArchiveOpener>,
    manifest: &ManifestDescriptor,
    config: &MirrorConfig,
    steps: AssetSteps,
) -> SyncResult<AssetReport>
where
    S: DocumentStore + ?Sized,
    C: CatalogClient + ?Sized,
{
    let report = AssetPipeline::new(config, sync, catalog, opener)
        .run(manifest, steps)
        .await?;

    if let Some(snapshot) = &report.snapshot {
        info!(
            bytes = snapshot.bytes,
            tables = snapshot.tables.len(),
            rows = snapshot.rows(),
            "snapshot read"
        );
    }
    if let Some(gear) = &report.gear {
        info!(
            items = gear.indexed_items,
            files = gear.files,
            dyes = gear.dyes,
            "gear synchronized"
        );
    }
    Ok(report)
}
