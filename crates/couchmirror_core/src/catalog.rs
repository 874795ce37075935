//! Catalog API abstraction.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{CatalogError, CatalogResult};
use crate::manifest::ManifestDescriptor;

/// A stream of body chunks.
pub type ByteStream = BoxStream<'static, CatalogResult<Bytes>>;

/// Read access to the remote catalog.
///
/// A 404 must surface as [`CatalogError::NotFound`]; every other non-2xx
/// answer is fatal to the calling operation.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetches and decodes the manifest descriptor.
    async fn fetch_manifest_descriptor(&self) -> CatalogResult<ManifestDescriptor>;

    /// Fetches a JSON document by CDN path.
    async fn fetch_json(&self, path: &str) -> CatalogResult<Value>;

    /// Streams a binary body by CDN path.
    async fn fetch_bytes(&self, path: &str) -> CatalogResult<ByteStream>;
}

/// An in-memory catalog, for testing.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    manifest: RwLock<Option<ManifestDescriptor>>,
    json: RwLock<HashMap<String, Value>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    fetches: RwLock<Vec<String>>,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the manifest descriptor.
    pub fn set_manifest(&self, manifest: ManifestDescriptor) {
        *self.manifest.write() = Some(manifest);
    }

    /// Serves `value` at `path`.
    pub fn insert_json(&self, path: impl Into<String>, value: Value) {
        self.json.write().insert(path.into(), value);
    }

    /// Serves `bytes` at `path`.
    pub fn insert_bytes(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.blobs.write().insert(path.into(), bytes.into());
    }

    /// Every path fetched so far, in request order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetches.read().clone()
    }

    fn record(&self, path: &str) {
        self.fetches.write().push(path.to_owned());
    }
}

#[async_trait]
impl CatalogClient for MemoryCatalog {
    async fn fetch_manifest_descriptor(&self) -> CatalogResult<ManifestDescriptor> {
        self.manifest
            .read()
            .clone()
            .ok_or_else(|| CatalogError::NotFound("Destiny2/Manifest/".into()))
    }

    async fn fetch_json(&self, path: &str) -> CatalogResult<Value> {
        self.record(path);
        self.json
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(path.to_owned()))
    }

    async fn fetch_bytes(&self, path: &str) -> CatalogResult<ByteStream> {
        self.record(path);
        let body = self
            .blobs
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(path.to_owned()))?;
        // Split into small chunks so consumers exercise multi-chunk streams.
        let chunks: Vec<CatalogResult<Bytes>> = body
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}
