pub mod merge;
pub mod normalizer;
pub mod relevance;
pub mod schema;

pub use merge::{FieldMerge, MergeEngine, MergeField, MergePolicy};
pub use normalizer::{DropReason, ListingNormalizer};
pub use relevance::{
    CompanyVerdict, KeywordCategory, KeywordTables, KnownCompanies, RelevanceClassifier,
    SearchScope,
};
pub use schema::{Identity, Listing, RawCandidate};

/// Wealth-tech watchlist used when no research output is available.
pub const DEFAULT_WATCHLIST: &[&str] = &[
    "Addepar",
    "Orion",
    "Envestnet",
    "Betterment",
    "Wealthfront",
    "Nitrogen",
    "Advyzon",
    "Pontera",
    "Farther",
    "Vanilla",
    "Savvy Wealth",
    "LifeYield",
    "InvestCloud",
    "SEI",
    "Morningstar",
    "Dynasty Financial",
    "Hightower",
    "YieldStreet",
    "CAIS",
    "iCapital",
    "Altruist",
    "RightCapital",
];
