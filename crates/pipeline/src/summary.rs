use chrono::NaiveDate;
use listings::Listing;
use serde::Serialize;
use uuid::Uuid;

/// Per-collector outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub label: String,
    pub collected: usize,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What one run found. `roles` holds only the listings that were new.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub collected: usize,
    pub malformed: usize,
    pub relevant: usize,
    pub merged_unique: usize,
    pub new_roles: usize,
    pub previously_seen: usize,
    pub total_seen_all_time: usize,
    pub sources: Vec<SourceReport>,
    pub roles: Vec<Listing>,
}

impl RunSummary {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.failed)
    }
}
