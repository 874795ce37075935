//! Configuration for synchronization runs.

use std::path::PathBuf;

/// Location of a single well-known document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRef {
    /// Database name.
    pub database: String,
    /// Document id.
    pub id: String,
}

impl DocRef {
    /// Creates a document reference.
    pub fn new(database: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            id: id.into(),
        }
    }
}

/// Configuration for a synchronization run.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Language selected from per-language manifest paths.
    pub language: String,
    /// Relational snapshot format version to ingest.
    pub snapshot_version: u32,
    /// Prefix stripped from snake-cased collection names.
    pub name_prefix: String,
    /// Suffix stripped from snake-cased collection names.
    pub name_suffix: String,
    /// Database holding the well-known metadata documents.
    pub meta_database: String,
    /// Database receiving gear definitions.
    pub gear_database: String,
    /// Database receiving deduplicated dye records.
    pub dye_database: String,
    /// Document listing gear definition files per item.
    pub gear_index: DocRef,
    /// Directory for snapshot downloads; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Gear definition fetches kept in flight at once.
    pub gear_fetch_concurrency: usize,
}

impl MirrorConfig {
    /// Creates a configuration with the default naming and database layout.
    pub fn new() -> Self {
        Self {
            language: "en".into(),
            snapshot_version: 2,
            name_prefix: "destiny_".into(),
            name_suffix: "_definition".into(),
            meta_database: "meta".into(),
            gear_database: "gear".into(),
            dye_database: "dye_manifest".into(),
            gear_index: DocRef::new("meta", "gear_assets"),
            scratch_dir: None,
            gear_fetch_concurrency: 8,
        }
    }

    /// Sets the manifest language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Sets the required snapshot format version.
    pub fn with_snapshot_version(mut self, version: u32) -> Self {
        self.snapshot_version = version;
        self
    }

    /// Sets the prefix and suffix stripped by the naming transform.
    pub fn with_name_affixes(mut self, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self.name_suffix = suffix.into();
        self
    }

    /// Sets the location of the gear asset index document.
    pub fn with_gear_index(mut self, gear_index: DocRef) -> Self {
        self.gear_index = gear_index;
        self
    }

    /// Sets how many gear definition fetches run concurrently (at least one).
    pub fn with_gear_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.gear_fetch_concurrency = concurrency.max(1);
        self
    }

    /// Sets the scratch directory used for snapshot extraction.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self::new()
    }
}
