//! Deduplication of dye records embedded in gear definitions.

use std::collections::BTreeMap;

use crate::document::{as_array, as_object, id_of, Document};
use crate::error::{IntegrityViolation, SyncError, SyncResult};

/// Dye lists of a gear definition, in processing order.
pub const DYE_LISTS: [&str; 3] = ["default_dyes", "locked_dyes", "custom_dyes"];

#[derive(Debug)]
struct SeenDye {
    encoded: Vec<u8>,
    record: Document,
    source: String,
}

/// Distinct dye records seen during one gear pass.
///
/// Owned by a single consumer; every occurrence of a hash must encode to
/// the same bytes as the first one.
#[derive(Debug, Default)]
pub struct DyeSet {
    seen: BTreeMap<String, SeenDye>,
    occurrences: usize,
}

impl DyeSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every dye referenced by one gear definition.
    pub fn observe(&mut self, source: &str, gear: &Document) -> SyncResult<()> {
        for list in DYE_LISTS {
            let Some(dyes) = gear.get(list) else {
                continue;
            };
            let location = format!("{source}.{list}");
            for (index, dye) in as_array(dyes, &location)?.iter().enumerate() {
                let location = format!("{location}[{index}]");
                let record = as_object(dye, &location)?;
                let hash = id_of(
                    record.get("hash").unwrap_or(&serde_json::Value::Null),
                    &format!("{location}.hash"),
                )?;
                self.insert(hash, record, source)?;
            }
        }
        Ok(())
    }

    fn insert(&mut self, hash: String, record: &Document, source: &str) -> SyncResult<()> {
        let encoded = serde_json::to_vec(record)?;
        self.occurrences += 1;

        if let Some(first) = self.seen.get(&hash) {
            if first.encoded != encoded {
                return Err(IntegrityViolation::DivergentDye {
                    hash,
                    first_source: first.source.clone(),
                    second_source: source.to_owned(),
                }
                .into());
            }
            return Ok(());
        }

        self.seen.insert(
            hash,
            SeenDye {
                encoded,
                record: record.clone(),
                source: source.to_owned(),
            },
        );
        Ok(())
    }

    /// Number of distinct dyes.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns true if no dye was seen.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Total dye references seen, duplicates included.
    pub fn occurrences(&self) -> usize {
        self.occurrences
    }

    /// Consumes the set, yielding `(hash, record)` pairs in hash order.
    pub fn into_records(self) -> impl Iterator<Item = (String, Document)> {
        self.seen.into_iter().map(|(hash, seen)| (hash, seen.record))
    }
}
