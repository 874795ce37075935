//! World command implementation.

use couchmirror_core::{
    CatalogClient, DocumentStore, DocumentSynchronizer, ManifestDescriptor, ManifestWalker,
    MirrorConfig, NameTransform, SyncResult, WalkReport,
};
use tracing::info;

/// Runs the world command: the full world, or a single component of it.
pub async fn run<S, C>(
    sync: &DocumentSynchronizer<S>,
    catalog: &C,
    manifest: &ManifestDescriptor,
    config: &MirrorConfig,
    component: Option<&str>,
) -> SyncResult<WalkReport>
where
    S: DocumentStore + ?Sized,
    C: CatalogClient + ?Sized,
{
    let names = NameTransform::from_config(config);
    let walker = ManifestWalker::new(&names, sync);

    let report = match component {
        Some(component) => {
            walker
                .sync_component(catalog, manifest, &config.language, component)
                .await?
        }
        None => {
            walker
                .sync_from_catalog(catalog, manifest, &config.language)
                .await?
        }
    };

    info!(
        version = %manifest.version,
        collections = report.collections,
        entities = report.entities,
        databases_created = report.databases_created.len(),
        created = report.counts.created,
        updated = report.counts.updated,
        unchanged = report.counts.unchanged,
        "world synchronized"
    );
    Ok(report)
}
