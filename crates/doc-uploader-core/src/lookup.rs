//! Bulk-lookup wire types and result matching.
//!
//! The lookup service answers with a map from a *serialized lookup* (the JSON
//! of an [`EntityLookup`]) to either a record id or an error string prefixed
//! with [`ERROR_MARKER`]. Key order inside the serialized `namePath` is not
//! guaranteed, so results are matched by parsed name-path equality through a
//! [`LookupIndex`] rather than by comparing strings.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::{EntityType, NamePath};

/// Prefix the lookup service puts in front of per-entity failures.
pub const ERROR_MARKER: &str = "ERROR:";

/// One entity to resolve, addressed by its name path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLookup {
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    #[serde(rename = "namePath")]
    pub name_path: BTreeMap<String, String>,
}

impl EntityLookup {
    pub fn for_path(path: &NamePath) -> Self {
        Self {
            entity_type: path.entity_type(),
            name_path: path.to_wire(),
        }
    }

    /// The key the lookup service would use for this entity.
    pub fn result_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Request body of the bulk-lookup endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkLookupRequest {
    pub lookups: Vec<EntityLookup>,
}

/// A single lookup answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(String),
    Failed(String),
}

impl LookupOutcome {
    pub fn classify(value: &str) -> Self {
        if value.starts_with(ERROR_MARKER) {
            LookupOutcome::Failed(value.to_string())
        } else if value.trim().is_empty() {
            LookupOutcome::Failed(format!("{} empty identifier returned", ERROR_MARKER))
        } else {
            LookupOutcome::Found(value.to_string())
        }
    }
}

/// Lookup results indexed by name path.
#[derive(Debug, Default)]
pub struct LookupIndex {
    entries: HashMap<BTreeMap<String, String>, LookupOutcome>,
    skipped: Vec<String>,
}

impl LookupIndex {
    /// Index a raw response. Keys that are not a serialized [`EntityLookup`]
    /// are kept aside in [`skipped_keys`](Self::skipped_keys).
    pub fn build<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut index = LookupIndex::default();
        for (key, value) in results {
            match serde_json::from_str::<EntityLookup>(key) {
                Ok(lookup) => {
                    index
                        .entries
                        .insert(lookup.name_path, LookupOutcome::classify(value));
                }
                Err(_) => index.skipped.push(key.clone()),
            }
        }
        index
    }

    pub fn get(&self, path: &NamePath) -> Option<&LookupOutcome> {
        self.entries.get(&path.to_wire())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn skipped_keys(&self) -> &[String] {
        &self.skipped
    }
}
