use crate::schema::{Listing, RawCandidate};
use std::fmt;

pub const DEFAULT_SENTINELS: &[&str] = &["Unknown", "Not disclosed"];

/// Why a raw candidate did not become a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingCompany,
    MissingTitle,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::MissingCompany => write!(f, "missing required field: company"),
            DropReason::MissingTitle => write!(f, "missing required field: title"),
        }
    }
}

pub struct ListingNormalizer {
    /// Lowercased placeholder values that mean "unset"
    sentinels: Vec<String>,
}

impl Default for ListingNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINELS.iter().copied())
    }
}

impl ListingNormalizer {
    pub fn new<I, S>(sentinels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            sentinels: sentinels
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    /// Turn a raw candidate into a canonical listing.
    ///
    /// `fallback_source` tags the listing when the candidate does not name
    /// its own origin (usually the collector label).
    pub fn normalize(
        &self,
        raw: RawCandidate,
        fallback_source: &str,
    ) -> Result<Listing, DropReason> {
        let company = self.field(raw.company).ok_or(DropReason::MissingCompany)?;
        let title = self.field(raw.title).ok_or(DropReason::MissingTitle)?;

        let mut listing = Listing::new(company, title);
        listing.location = self.field(raw.location);
        listing.compensation = self.field(raw.compensation);
        listing.date_posted = self.field(raw.date_posted);
        listing.url = self.field(raw.url).and_then(|u| strip_query(&u));
        listing.segment = self.field(raw.segment);
        listing.stage = self.field(raw.stage);

        match self.field(raw.source) {
            Some(source) => listing.add_source(&source),
            None => listing.add_source(fallback_source),
        }

        Ok(listing)
    }

    /// Trimmed value, or None for empty strings and sentinels.
    fn field(&self, value: Option<String>) -> Option<String> {
        let value = value?;
        let trimmed = value.trim();
        if trimmed.is_empty() || self.is_sentinel(trimmed) {
            return None;
        }
        Some(trimmed.to_string())
    }

    pub fn is_sentinel(&self, value: &str) -> bool {
        let folded = value.trim().to_lowercase();
        self.sentinels.iter().any(|s| *s == folded)
    }
}

/// Drop the query string and fragment so tracking parameters don't split
/// one posting into two.
pub fn strip_query(url: &str) -> Option<String> {
    let base = url.split(['?', '#']).next().unwrap_or_default().trim();
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}
