//! Manifest command implementation.

use couchmirror_core::{ManifestDescriptor, SnapshotDescriptor};
use serde::Serialize;
use std::collections::BTreeMap;

/// Manifest descriptor summary, grouped by content category.
#[derive(Debug, Serialize)]
pub struct ManifestSummary {
    /// Manifest version.
    pub version: String,
    /// World content path per language.
    pub world_content: BTreeMap<String, String>,
    /// World component names published for the selected language.
    pub world_components: Vec<String>,
    /// Relational snapshots.
    pub snapshots: Vec<SnapshotDescriptor>,
    /// Gear CDN prefixes.
    pub gear_cdn: BTreeMap<String, String>,
    /// Names of the remaining, untyped entries.
    pub other: Vec<String>,
}

impl ManifestSummary {
    /// Summarizes `manifest`, listing components for `language`.
    pub fn new(manifest: &ManifestDescriptor, language: &str) -> Self {
        Self {
            version: manifest.version.clone(),
            world_content: manifest.json_world_content_paths.clone(),
            world_components: manifest
                .json_world_component_content_paths
                .get(language)
                .map(|components| components.keys().cloned().collect())
                .unwrap_or_default(),
            snapshots: manifest.mobile_gear_asset_data_bases.clone(),
            gear_cdn: manifest.mobile_gear_cdn.clone(),
            other: manifest.other.keys().cloned().collect(),
        }
    }
}

/// Runs the manifest command.
pub fn run(
    manifest: &ManifestDescriptor,
    language: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = ManifestSummary::new(manifest, language);
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print!("{}", render_text(&summary, language)),
    }
    Ok(())
}

fn render_text(summary: &ManifestSummary, language: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("Manifest version: {}\n", summary.version));

    out.push_str("\nWorld content:\n");
    for (lang, path) in &summary.world_content {
        out.push_str(&format!("  {lang:<8} {path}\n"));
    }

    out.push_str(&format!(
        "\nWorld components ({language}): {}\n",
        summary.world_components.len()
    ));
    for component in &summary.world_components {
        out.push_str(&format!("  {component}\n"));
    }

    out.push_str("\nSnapshots:\n");
    for snapshot in &summary.snapshots {
        out.push_str(&format!("  v{:<7} {}\n", snapshot.version, snapshot.path));
    }

    out.push_str("\nGear CDN:\n");
    for (kind, path) in &summary.gear_cdn {
        out.push_str(&format!("  {kind:<8} {path}\n"));
    }

    if !summary.other.is_empty() {
        out.push_str(&format!("\nOther entries: {}\n", summary.other.join(", ")));
    }
    out
}
