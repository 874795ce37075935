//! Source collection name to store database name mapping.

use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;

use crate::config::MirrorConfig;

/// Maps source collection identifiers (`DestinyInventoryItemDefinition`)
/// to store database names (`inventory_item`).
///
/// The transform is pure; results are memoized per instance so the
/// output can be used as a cache key without recomputation.
#[derive(Debug)]
pub struct NameTransform {
    word_start: Regex,
    case_step: Regex,
    prefix: String,
    suffix: String,
    cache: Mutex<HashMap<String, String>>,
}

impl NameTransform {
    /// Creates a transform stripping the given prefix and suffix tokens.
    #[allow(clippy::expect_used)]
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            word_start: Regex::new("(.)([A-Z][a-z]+)").expect("literal pattern"),
            case_step: Regex::new("([a-z0-9])([A-Z])").expect("literal pattern"),
            prefix: prefix.into(),
            suffix: suffix.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a transform from the run configuration.
    pub fn from_config(config: &MirrorConfig) -> Self {
        Self::new(config.name_prefix.clone(), config.name_suffix.clone())
    }

    /// Returns the database name for a source collection name.
    pub fn database_name(&self, source: &str) -> String {
        if let Some(hit) = self.cache.lock().get(source) {
            return hit.clone();
        }
        let name = self.compute(source);
        self.cache.lock().insert(source.to_owned(), name.clone());
        name
    }

    /// Number of distinct names computed so far.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn compute(&self, source: &str) -> String {
        let snake = self.word_start.replace_all(source, "${1}_${2}");
        let snake = self.case_step.replace_all(&snake, "${1}_${2}").to_lowercase();

        let mut name = snake.as_str();
        if !self.prefix.is_empty() {
            name = name.strip_prefix(self.prefix.as_str()).unwrap_or(name);
        }
        if !self.suffix.is_empty() {
            name = name.strip_suffix(self.suffix.as_str()).unwrap_or(name);
        }
        name.to_owned()
    }
}

impl Default for NameTransform {
    fn default() -> Self {
        Self::from_config(&MirrorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_prefix_and_suffix() {
        let names = NameTransform::default();
        assert_eq!(names.database_name("DestinyInventoryItemDefinition"), "inventory_item");
        assert_eq!(names.database_name("DestinyFooDefinition"), "foo");
        assert_eq!(
            names.database_name("DestinyInventoryItemLiteDefinition"),
            "inventory_item_lite"
        );
    }

    #[test]
    fn affixes_are_independent() {
        let names = NameTransform::default();
        assert_eq!(names.database_name("DestinyVendorGroup"), "vendor_group");
        assert_eq!(names.database_name("StatDefinition"), "stat");
        assert_eq!(names.database_name("GearAssets"), "gear_assets");
    }

    #[test]
    fn acronyms_and_digits() {
        let names = NameTransform::new("", "");
        assert_eq!(names.database_name("HTTPResponseCode"), "http_response_code");
        assert_eq!(names.database_name("Item2Stat"), "item2_stat");
        assert_eq!(names.database_name("already_snake"), "already_snake");
        assert_eq!(names.database_name(""), "");
    }

    #[test]
    fn prefix_is_matched_after_lowercasing() {
        let names = NameTransform::default();
        // "destiny" without a following boundary never becomes "destiny_"
        assert_eq!(names.database_name("Destinyfoo"), "destinyfoo");
        assert_eq!(names.database_name("Destiny"), "destiny");
    }

    #[test]
    fn results_are_memoized() {
        let names = NameTransform::default();
        names.database_name("DestinyFooDefinition");
        names.database_name("DestinyFooDefinition");
        names.database_name("DestinyBarDefinition");
        assert_eq!(names.cached_len(), 2);
    }

    proptest! {
        #[test]
        fn deterministic(source in "[A-Za-z0-9_]{0,40}") {
            let names = NameTransform::default();
            let first = names.database_name(&source);
            let fresh = NameTransform::default().database_name(&source);
            prop_assert_eq!(&first, &names.database_name(&source));
            prop_assert_eq!(first, fresh);
        }

        #[test]
        fn output_has_no_ascii_uppercase(source in "[A-Za-z0-9]{0,40}") {
            let name = NameTransform::default().database_name(&source);
            prop_assert!(!name.chars().any(|c| c.is_ascii_uppercase()));
        }

        #[test]
        fn snake_case_without_affixes_is_fixed_point(source in "[a-z][a-z0-9_]{0,30}") {
            prop_assume!(!source.starts_with("destiny_") && !source.ends_with("_definition"));
            let names = NameTransform::default();
            prop_assert_eq!(names.database_name(&source), source);
        }
    }
}
