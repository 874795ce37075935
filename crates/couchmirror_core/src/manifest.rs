//! Manifest descriptor and world content types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{CatalogError, CatalogResult, IntegrityViolation};

/// World content: collection kind name -> stringified hash -> entity.
pub type WorldJson = Map<String, Value>;

/// One published relational snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDescriptor {
    /// Snapshot format version.
    pub version: u32,
    /// CDN path of the compressed archive.
    pub path: String,
}

/// The catalog's manifest descriptor, scoped to one synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDescriptor {
    /// Manifest version string.
    #[serde(default)]
    pub version: String,
    /// Per-language path of the full world JSON.
    #[serde(default)]
    pub json_world_content_paths: BTreeMap<String, String>,
    /// Per-language, per-component world JSON paths.
    #[serde(default)]
    pub json_world_component_content_paths: BTreeMap<String, BTreeMap<String, String>>,
    /// Relational snapshots, one per format version.
    #[serde(default)]
    pub mobile_gear_asset_data_bases: Vec<SnapshotDescriptor>,
    /// CDN path prefixes for gear assets, by asset kind.
    #[serde(default, rename = "mobileGearCDN")]
    pub mobile_gear_cdn: BTreeMap<String, String>,
    /// Every other manifest entry, untyped.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ManifestDescriptor {
    /// Decodes a descriptor from the `Response` body of the manifest endpoint.
    pub fn from_value(value: Value) -> CatalogResult<Self> {
        serde_json::from_value(value).map_err(|e| CatalogError::Decode(e.to_string()))
    }

    /// Path of the full world JSON for a language.
    pub fn world_content_path(&self, language: &str) -> CatalogResult<&str> {
        self.json_world_content_paths
            .get(language)
            .map(String::as_str)
            .ok_or_else(|| CatalogError::NotFound(format!("jsonWorldContentPaths.{language}")))
    }

    /// Path of one world component for a language.
    pub fn world_component_path(&self, language: &str, component: &str) -> CatalogResult<&str> {
        self.json_world_component_content_paths
            .get(language)
            .and_then(|components| components.get(component))
            .map(String::as_str)
            .ok_or_else(|| {
                CatalogError::NotFound(format!(
                    "jsonWorldComponentContentPaths.{language}.{component}"
                ))
            })
    }

    /// The relational snapshot published with the given format version.
    pub fn snapshot(&self, version: u32) -> Result<&SnapshotDescriptor, IntegrityViolation> {
        self.mobile_gear_asset_data_bases
            .iter()
            .find(|s| s.version == version)
            .ok_or(IntegrityViolation::MissingSnapshotVersion { version })
    }

    /// CDN prefix for gear definition files.
    pub fn gear_cdn_prefix(&self) -> CatalogResult<&str> {
        self.mobile_gear_cdn
            .get("Gear")
            .map(String::as_str)
            .ok_or_else(|| CatalogError::NotFound("mobileGearCDN.Gear".into()))
    }
}

/// Unwraps a platform response envelope (`ErrorCode`, `ErrorStatus`, `Response`).
pub fn unwrap_envelope(mut body: Value) -> CatalogResult<Value> {
    let code = body.get("ErrorCode").and_then(Value::as_i64).ok_or_else(|| {
        CatalogError::Decode("response envelope has no ErrorCode".into())
    })?;
    if code != 1 {
        let status = body
            .get("ErrorStatus")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        return Err(CatalogError::Api { code, status });
    }
    body.get_mut("Response")
        .map(Value::take)
        .ok_or_else(|| CatalogError::Decode("response envelope has no Response".into()))
}
