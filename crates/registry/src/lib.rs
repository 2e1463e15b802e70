pub mod error;
pub mod store;

pub use error::RegistryError;
pub use store::RegistryStore;

use chrono::NaiveDate;
use listings::Listing;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// First-seen record for an identity. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub company: String,
    pub title: String,
    pub first_seen: NaiveDate,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub segment: Option<String>,
}

impl RegistryEntry {
    pub fn from_listing(listing: &Listing, as_of: NaiveDate) -> Self {
        Self {
            company: listing.company().to_string(),
            title: listing.title().to_string(),
            first_seen: as_of,
            url: listing.url.clone(),
            segment: listing.segment.clone(),
        }
    }
}

/// One insertion, as recorded in the commit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub identity: String,
    pub entry: RegistryEntry,
}

#[derive(Debug, Default)]
pub struct NoveltyDiff {
    pub new: Vec<Listing>,
    pub seen: Vec<Listing>,
}

/// In-memory view of every identity ever observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, RegistryEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&RegistryEntry> {
        self.entries.get(identity)
    }

    pub fn entries(&self) -> &BTreeMap<String, RegistryEntry> {
        &self.entries
    }

    /// Split merged listings into new and previously seen. New listings are
    /// flagged `is_new`; the registry itself is not touched.
    pub fn diff(&self, merged: Vec<Listing>) -> NoveltyDiff {
        let mut diff = NoveltyDiff::default();
        for mut listing in merged {
            if self.contains(listing.identity().as_str()) {
                listing.is_new = false;
                diff.seen.push(listing);
            } else {
                listing.is_new = true;
                diff.new.push(listing);
            }
        }
        diff
    }

    /// Record first sightings. Identities already present keep their
    /// original entry; only actual insertions are returned.
    pub fn commit(&mut self, new: &[Listing], as_of: NaiveDate) -> Vec<CommitEvent> {
        new.iter()
            .filter_map(|listing| {
                let event = CommitEvent {
                    identity: listing.identity().to_string(),
                    entry: RegistryEntry::from_listing(listing, as_of),
                };
                self.apply(event.clone()).then_some(event)
            })
            .collect()
    }

    /// Insert unless present. Returns whether the entry was inserted.
    pub(crate) fn apply(&mut self, event: CommitEvent) -> bool {
        match self.entries.entry(event.identity) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(event.entry);
                true
            }
        }
    }
}
