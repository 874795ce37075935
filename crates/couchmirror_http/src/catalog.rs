//! Catalog platform client.

use async_trait::async_trait;
use couchmirror_core::{
    unwrap_envelope, ByteStream, CatalogClient, CatalogError, CatalogResult, ManifestDescriptor,
};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::config::CatalogConfig;

/// Manifest endpoint, relative to the platform root.
pub const MANIFEST_PATH: &str = "Destiny2/Manifest/";

/// A [`CatalogClient`] for the public catalog platform.
///
/// Every request carries the `X-API-Key` header. Content paths published in
/// the manifest are absolute and resolve against the platform host.
pub struct HttpCatalog {
    client: Client,
    root: Url,
}

impl HttpCatalog {
    /// Creates a client.
    pub fn new(config: CatalogConfig) -> CatalogResult<Self> {
        let root = Url::parse(&config.root)
            .map_err(|e| CatalogError::transport(format!("invalid catalog root: {e}")))?;

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| CatalogError::transport("API key is not a valid header value"))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| CatalogError::transport(e.to_string()))?;
        Ok(Self { client, root })
    }

    /// Resolves `path` against the platform root.
    pub fn resolve(&self, path: &str) -> CatalogResult<Url> {
        self.root
            .join(path)
            .map_err(|e| CatalogError::transport(format!("invalid path {path}: {e}")))
    }

    async fn get(&self, path: &str) -> CatalogResult<Response> {
        let url = self.resolve(path)?;
        debug!(%url, "catalog request");
        let response = self.client.get(url).send().await.map_err(transport)?;
        check_status(path, response.status())?;
        Ok(response)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalog {
    async fn fetch_manifest_descriptor(&self) -> CatalogResult<ManifestDescriptor> {
        let body: Value = self
            .get(MANIFEST_PATH)
            .await?
            .json()
            .await
            .map_err(decode)?;
        ManifestDescriptor::from_value(unwrap_envelope(body)?)
    }

    async fn fetch_json(&self, path: &str) -> CatalogResult<Value> {
        self.get(path).await?.json().await.map_err(decode)
    }

    async fn fetch_bytes(&self, path: &str) -> CatalogResult<ByteStream> {
        let response = self.get(path).await?;
        Ok(response.bytes_stream().map_err(transport).boxed())
    }
}

/// Maps a response status onto the catalog error contract.
pub fn check_status(path: &str, status: StatusCode) -> CatalogResult<()> {
    if status == StatusCode::NOT_FOUND {
        return Err(CatalogError::NotFound(path.to_owned()));
    }
    if !status.is_success() {
        return Err(CatalogError::Transport {
            message: format!("GET {path} returned {status}"),
            status: Some(status.as_u16()),
        });
    }
    Ok(())
}

fn transport(e: reqwest::Error) -> CatalogError {
    CatalogError::Transport {
        message: e.to_string(),
        status: e.status().map(|s| s.as_u16()),
    }
}

fn decode(e: reqwest::Error) -> CatalogError {
    CatalogError::Decode(e.to_string())
}
