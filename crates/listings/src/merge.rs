use crate::schema::{Identity, Listing};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Optional listing fields that can be reconciled on an identity collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeField {
    Url,
    Compensation,
    DatePosted,
    Location,
    Segment,
    Stage,
}

impl MergeField {
    fn slot(self, listing: &mut Listing) -> &mut Option<String> {
        match self {
            MergeField::Url => &mut listing.url,
            MergeField::Compensation => &mut listing.compensation,
            MergeField::DatePosted => &mut listing.date_posted,
            MergeField::Location => &mut listing.location,
            MergeField::Segment => &mut listing.segment,
            MergeField::Stage => &mut listing.stage,
        }
    }

    fn value(self, listing: &Listing) -> &Option<String> {
        match self {
            MergeField::Url => &listing.url,
            MergeField::Compensation => &listing.compensation,
            MergeField::DatePosted => &listing.date_posted,
            MergeField::Location => &listing.location,
            MergeField::Segment => &listing.segment,
            MergeField::Stage => &listing.stage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMerge {
    /// Keep a set value; only fill the canonical slot when it is unset.
    FirstSetWins,
    /// Any set incoming value replaces the canonical one.
    LatestSetWins,
}

impl FieldMerge {
    pub fn apply(self, canonical: &mut Option<String>, incoming: &Option<String>) {
        let Some(value) = incoming else {
            return;
        };
        match self {
            FieldMerge::FirstSetWins => {
                if canonical.is_none() {
                    *canonical = Some(value.clone());
                }
            }
            FieldMerge::LatestSetWins => *canonical = Some(value.clone()),
        }
    }
}

/// Per-field merge rules. Fields not listed keep the canonical value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePolicy {
    pub fields: Vec<(MergeField, FieldMerge)>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::uniform(FieldMerge::FirstSetWins)
    }
}

impl MergePolicy {
    /// Same rule for url, compensation, date posted and location.
    pub fn uniform(rule: FieldMerge) -> Self {
        Self {
            fields: vec![
                (MergeField::Url, rule),
                (MergeField::Compensation, rule),
                (MergeField::DatePosted, rule),
                (MergeField::Location, rule),
            ],
        }
    }

    pub fn latest_wins() -> Self {
        Self::uniform(FieldMerge::LatestSetWins)
    }
}

#[derive(Default)]
pub struct MergeEngine {
    policy: MergePolicy,
}

impl MergeEngine {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    /// Collapse batches into one listing per identity.
    ///
    /// Batches are consumed in the order given, which is their priority:
    /// the first listing seen for an identity is the canonical record and
    /// later ones only contribute through the field policy.
    pub fn merge<I, B>(&self, batches: I) -> Vec<Listing>
    where
        I: IntoIterator<Item = B>,
        B: IntoIterator<Item = Listing>,
    {
        let mut index: HashMap<Identity, usize> = HashMap::new();
        let mut merged: Vec<Listing> = Vec::new();

        for listing in batches.into_iter().flatten() {
            match index.get(listing.identity()) {
                Some(&pos) => {
                    debug!(identity = %listing.identity(), "Merging duplicate listing");
                    self.absorb(&mut merged[pos], &listing);
                }
                None => {
                    index.insert(listing.identity().clone(), merged.len());
                    merged.push(listing);
                }
            }
        }

        merged
    }

    fn absorb(&self, canonical: &mut Listing, incoming: &Listing) {
        for source in &incoming.sources {
            canonical.add_source(source);
        }
        for &(field, rule) in &self.policy.fields {
            rule.apply(field.slot(canonical), field.value(incoming));
        }
    }
}
