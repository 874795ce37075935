//! World content traversal.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::info;

use crate::catalog::CatalogClient;
use crate::document::{as_object, into_object};
use crate::error::{IntegrityViolation, SyncResult};
use crate::manifest::{ManifestDescriptor, WorldJson};
use crate::naming::NameTransform;
use crate::reconciler::ensure_databases;
use crate::store::DocumentStore;
use crate::synchronizer::{DocumentSynchronizer, SyncCounts};

/// Summary of one world walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Collections visited.
    pub collections: usize,
    /// Entities synchronized.
    pub entities: usize,
    /// Databases that had to be created.
    pub databases_created: Vec<String>,
    /// Store outcomes for this walk.
    pub counts: SyncCounts,
}

/// Drives per-entity synchronization over world content.
pub struct ManifestWalker<'a, S: DocumentStore + ?Sized> {
    names: &'a NameTransform,
    sync: &'a DocumentSynchronizer<S>,
}

impl<'a, S: DocumentStore + ?Sized> ManifestWalker<'a, S> {
    /// Creates a walker.
    pub fn new(names: &'a NameTransform, sync: &'a DocumentSynchronizer<S>) -> Self {
        Self { names, sync }
    }

    /// Synchronizes every entity of every collection in `world`.
    ///
    /// Entities without a `hash` get one from their key; a declared hash that
    /// disagrees with its key aborts the walk.
    pub async fn sync_world(&self, world: WorldJson) -> SyncResult<WalkReport> {
        let before = self.sync.counts();

        let required: BTreeSet<String> =
            world.keys().map(|kind| self.names.database_name(kind)).collect();
        let databases_created = ensure_databases(self.sync.store().as_ref(), &required).await?;

        let mut report = WalkReport {
            databases_created,
            ..WalkReport::default()
        };

        for (kind, items) in world {
            let database = self.names.database_name(&kind);
            let items = into_object(items, &kind)?;
            info!(kind = %kind, database = %database, entities = items.len(), "syncing collection");

            for (key, entity) in items {
                let hash = parse_hash_key(&kind, &key)?;
                let mut entity = into_object(entity, &format!("{kind}.{key}"))?;
                match entity.get("hash") {
                    None => {
                        entity.insert("hash".into(), Value::from(hash));
                    }
                    Some(declared) if declared.as_i64() == Some(hash) => {}
                    Some(declared) => {
                        return Err(IntegrityViolation::HashMismatch {
                            kind,
                            key: hash,
                            declared: declared.to_string(),
                        }
                        .into());
                    }
                }
                self.sync
                    .sync_entity(&database, &hash.to_string(), &entity)
                    .await?;
                report.entities += 1;
            }
            report.collections += 1;
        }

        report.counts = diff(before, self.sync.counts());
        info!(
            collections = report.collections,
            entities = report.entities,
            writes = report.counts.writes(),
            "world sync complete"
        );
        Ok(report)
    }

    /// Fetches the full world for `language` and synchronizes it.
    pub async fn sync_from_catalog<C>(
        &self,
        catalog: &C,
        manifest: &ManifestDescriptor,
        language: &str,
    ) -> SyncResult<WalkReport>
    where
        C: CatalogClient + ?Sized,
    {
        let path = manifest.world_content_path(language)?;
        info!(path, language, "fetching world content");
        let world = catalog.fetch_json(path).await?;
        self.sync_world(into_object(world, "world")?).await
    }

    /// Fetches a single world component and synchronizes it.
    pub async fn sync_component<C>(
        &self,
        catalog: &C,
        manifest: &ManifestDescriptor,
        language: &str,
        component: &str,
    ) -> SyncResult<WalkReport>
    where
        C: CatalogClient + ?Sized,
    {
        let path = manifest.world_component_path(language, component)?;
        info!(path, component, "fetching world component");
        let items = catalog.fetch_json(path).await?;
        as_object(&items, component)?;

        let mut world = WorldJson::new();
        world.insert(component.to_owned(), items);
        self.sync_world(world).await
    }
}

/// Parses a collection key as a 32-bit hash.
///
/// Keys may be written in signed or unsigned form; the value is kept as
/// written so it compares equal to the entity's declared `hash`.
pub fn parse_hash_key(kind: &str, key: &str) -> Result<i64, IntegrityViolation> {
    key.parse::<i64>()
        .ok()
        .filter(|h| (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(h))
        .ok_or_else(|| IntegrityViolation::InvalidHashKey {
            kind: kind.to_owned(),
            key: key.to_owned(),
        })
}

fn diff(before: SyncCounts, after: SyncCounts) -> SyncCounts {
    SyncCounts {
        created: after.created - before.created,
        updated: after.updated - before.updated,
        unchanged: after.unchanged - before.unchanged,
    }
}
