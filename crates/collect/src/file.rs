use crate::error::CollectError;
use crate::json::parse_candidates;
use crate::reader::ResultsDir;
use crate::Collector;
use async_trait::async_trait;
use chrono::NaiveDate;
use listings::{RawCandidate, SearchScope};
use tracing::{info, warn};

/// Replays a batch that an earlier run saved to the results directory.
pub struct FileCollector {
    label: String,
    name: String,
    date: Option<NaiveDate>,
    scope: SearchScope,
    results: ResultsDir,
}

impl FileCollector {
    /// `name` is the artifact prefix, e.g. `agent2` for `agent2_2026-02-19.json`.
    pub fn new(label: impl Into<String>, name: impl Into<String>, results: ResultsDir) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
            date: None,
            scope: SearchScope::Broad,
            results,
        }
    }

    /// Prefer this date's file; the newest file is still used as a fallback.
    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }
}

#[async_trait]
impl Collector for FileCollector {
    fn label(&self) -> &str {
        &self.label
    }

    fn scope(&self) -> SearchScope {
        self.scope
    }

    fn is_replay(&self) -> bool {
        true
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>, CollectError> {
        let exact = match self.date {
            Some(date) => self.results.load(&self.name, date).await?,
            None => None,
        };

        let value = match exact {
            Some(value) => value,
            None => match self.results.latest(&self.name).await? {
                Some((value, date)) => {
                    info!(collector = %self.label, %date, "Using newest saved results");
                    value
                }
                None => return Err(CollectError::NotFound(self.name.clone())),
            },
        };

        let batch = parse_candidates(value);
        if batch.skipped > 0 {
            warn!(collector = %self.label, skipped = batch.skipped, "Skipped malformed entries");
        }
        Ok(batch.candidates)
    }
}
