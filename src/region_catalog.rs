//! Adapter around the externally owned region list. The engine never
//! fetches or persists regions itself; a fresh catalog is pushed in
//! whenever the embedding application changes it.

use crate::instruction::normalize_name;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEntry {
    pub name: String,
    /// Abbreviation key; this is what region tuples store and what all
    /// matching runs on.
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCatalog {
    entries: Vec<RegionEntry>,
}

impl RegionCatalog {
    /// Duplicate tags (after normalization) keep their first entry.
    pub fn new(entries: Vec<RegionEntry>) -> Self {
        let entries = entries
            .into_iter()
            .unique_by(|entry| normalize_name(&entry.tag))
            .collect();
        Self { entries }
    }

    /// Convenience constructor for catalogs where name and tag coincide.
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            tags.into_iter()
                .map(|tag| {
                    let tag = tag.into();
                    RegionEntry {
                        name: tag.clone(),
                        tag,
                    }
                })
                .collect(),
        )
    }

    pub fn contains_tag(&self, tag: &str) -> bool {
        let key = normalize_name(tag);
        self.entries
            .iter()
            .any(|entry| normalize_name(&entry.tag) == key)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.tag.as_str())
    }

    pub fn entries(&self) -> &[RegionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
