use crate::error::PipelineError;
use crate::metrics::{Metrics, TimedOperation};
use crate::retry::RetryPolicy;
use crate::summary::{RunSummary, SourceReport};
use chrono::NaiveDate;
use collect::{Collector, ResultsDir};
use listings::{
    DEFAULT_WATCHLIST, KnownCompanies, Listing, ListingNormalizer, MergeEngine, RawCandidate,
    RelevanceClassifier, SearchScope,
};
use registry::RegistryStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Raw output of one collector, in the collector's priority slot.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub label: String,
    pub scope: SearchScope,
    pub candidates: Vec<RawCandidate>,
    /// Set when the collector failed and the batch was replaced by an empty one
    pub error: Option<String>,
    /// Replayed from the results directory; never saved back
    pub replay: bool,
}

impl SourceBatch {
    pub fn new(label: impl Into<String>, scope: SearchScope, candidates: Vec<RawCandidate>) -> Self {
        Self {
            label: label.into(),
            scope,
            candidates,
            error: None,
            replay: false,
        }
    }

    pub fn failed(label: impl Into<String>, scope: SearchScope, error: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            scope,
            candidates: Vec::new(),
            error: Some(error.into()),
            replay: false,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Normalized, filtered and merged output, before the registry is consulted.
#[derive(Debug, Clone)]
pub struct ProcessedRun {
    pub collected: usize,
    pub malformed: usize,
    pub relevant: usize,
    pub merged: Vec<Listing>,
    pub sources: Vec<SourceReport>,
}

pub struct RunCoordinator {
    collectors: Vec<Arc<dyn Collector>>,
    retry: RetryPolicy,
    max_concurrent: usize,
    collector_timeout: Duration,
    relevance_enabled: bool,
    classifier: RelevanceClassifier,
    known: KnownCompanies,
    normalizer: ListingNormalizer,
    merger: MergeEngine,
    results: Option<ResultsDir>,
    export_snapshot: bool,
    metrics: Arc<Metrics>,
}

impl RunCoordinator {
    /// Collectors are in priority order: earlier collectors win merge ties.
    pub fn new(collectors: Vec<Arc<dyn Collector>>) -> Self {
        Self {
            collectors,
            retry: RetryPolicy::default(),
            max_concurrent: 2,
            collector_timeout: Duration::from_secs(600),
            relevance_enabled: true,
            classifier: RelevanceClassifier::default(),
            known: KnownCompanies::new(DEFAULT_WATCHLIST),
            normalizer: ListingNormalizer::default(),
            merger: MergeEngine::default(),
            results: None,
            export_snapshot: false,
            metrics: Metrics::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_collector_timeout(mut self, timeout: Duration) -> Self {
        self.collector_timeout = timeout;
        self
    }

    pub fn with_relevance(
        mut self,
        enabled: bool,
        classifier: RelevanceClassifier,
        known: KnownCompanies,
    ) -> Self {
        self.relevance_enabled = enabled;
        self.classifier = classifier;
        self.known = known;
        self
    }

    pub fn with_normalizer(mut self, normalizer: ListingNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_merge(mut self, merger: MergeEngine) -> Self {
        self.merger = merger;
        self
    }

    /// Save raw batches and summaries here after each run.
    pub fn with_results(mut self, results: ResultsDir) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_snapshot_export(mut self, export: bool) -> Self {
        self.export_snapshot = export;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn collector_labels(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.label()).collect()
    }

    /// Run every collector, at most `max_concurrent` at a time. Batches come
    /// back in declared order regardless of which collector finished first.
    pub async fn collect(&self) -> Vec<SourceBatch> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(self.collectors.len());

        for collector in &self.collectors {
            let collector = Arc::clone(collector);
            let semaphore = Arc::clone(&semaphore);
            let retry = self.retry.clone();
            let limit = self.collector_timeout;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let label = collector.label().to_string();

                let work = retry.invoke(&label, || collector.collect());
                match tokio::time::timeout(limit, work).await {
                    Ok(Ok(candidates)) => Ok(candidates),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {}s", limit.as_secs())),
                }
            }));
        }

        let mut batches = Vec::with_capacity(handles.len());
        for (collector, handle) in self.collectors.iter().zip(handles) {
            let label = collector.label();
            let scope = collector.scope();

            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(format!("collector task panicked: {}", e)),
            };

            match outcome {
                Ok(candidates) => {
                    info!(collector = label, found = candidates.len(), "Collector finished");
                    let mut batch = SourceBatch::new(label, scope, candidates);
                    batch.replay = collector.is_replay();
                    batches.push(batch);
                }
                Err(error) => {
                    warn!(
                        collector = label,
                        error = %error,
                        "Collector failed, continuing with an empty batch"
                    );
                    self.metrics.record_collector_failure();
                    batches.push(SourceBatch::failed(label, scope, error));
                }
            }
        }

        batches
    }

    /// Normalize, filter and merge batches given in priority order.
    pub fn process(&self, batches: Vec<SourceBatch>) -> ProcessedRun {
        let mut collected = 0;
        let mut malformed = 0;
        let mut relevant = 0;
        let mut sources = Vec::with_capacity(batches.len());
        let mut kept_batches = Vec::with_capacity(batches.len());

        for batch in batches {
            collected += batch.candidates.len();
            sources.push(SourceReport {
                label: batch.label.clone(),
                collected: batch.candidates.len(),
                failed: batch.is_failed(),
                error: batch.error.clone(),
            });

            let mut kept = Vec::new();
            for raw in batch.candidates {
                let listing = match self.normalizer.normalize(raw, &batch.label) {
                    Ok(listing) => listing,
                    Err(reason) => {
                        malformed += 1;
                        debug!(collector = %batch.label, %reason, "Dropped candidate");
                        continue;
                    }
                };

                if self.relevance_enabled
                    && !self.classifier.classify_scoped(
                        listing.title(),
                        listing.company(),
                        &self.known,
                        batch.scope,
                    )
                {
                    debug!(
                        collector = %batch.label,
                        company = listing.company(),
                        title = listing.title(),
                        "Not relevant"
                    );
                    continue;
                }

                relevant += 1;
                kept.push(listing);
            }
            kept_batches.push(kept);
        }

        let merged = self.merger.merge(kept_batches);
        info!(
            collected,
            malformed,
            relevant,
            merged_unique = merged.len(),
            "Merged source batches"
        );

        ProcessedRun {
            collected,
            malformed,
            relevant,
            merged,
            sources,
        }
    }

    /// Collect from every source, then run the rest of the pipeline.
    pub async fn run(
        &self,
        store: &RegistryStore,
        as_of: NaiveDate,
    ) -> Result<RunSummary, PipelineError> {
        let batches = self.collect().await;
        self.save_batches(&batches, as_of).await;
        self.run_with_batches(batches, store, as_of).await
    }

    /// Merge-only mode: the pipeline after collection, over batches that
    /// were gathered elsewhere.
    pub async fn run_with_batches(
        &self,
        batches: Vec<SourceBatch>,
        store: &RegistryStore,
        as_of: NaiveDate,
    ) -> Result<RunSummary, PipelineError> {
        let timer = TimedOperation::start();
        self.metrics.record_run_started();

        let result = self.finish(batches, store, as_of).await;
        self.metrics.record_run(timer.elapsed(), result.is_ok());

        let summary = result?;
        self.save_summary(&summary).await;
        Ok(summary)
    }

    async fn finish(
        &self,
        batches: Vec<SourceBatch>,
        store: &RegistryStore,
        as_of: NaiveDate,
    ) -> Result<RunSummary, PipelineError> {
        let processed = self.process(batches);
        self.metrics
            .record_candidates(processed.collected, processed.malformed);
        let merged_unique = processed.merged.len();

        let mut registry = store.load().await;
        let diff = registry.diff(processed.merged);
        let events = registry.commit(&diff.new, as_of);
        store.append(&events).await?;

        // the log already holds these entries; the snapshot is only a checkpoint
        if self.export_snapshot {
            if let Err(e) = store.export_snapshot(&registry).await {
                warn!(error = %e, "Could not export registry snapshot");
            }
        }

        self.metrics.record_new_listings(diff.new.len());
        info!(
            new_roles = diff.new.len(),
            previously_seen = diff.seen.len(),
            total_seen_all_time = registry.len(),
            "Novelty check complete"
        );

        Ok(RunSummary {
            run_id: Uuid::new_v4(),
            date: as_of,
            collected: processed.collected,
            malformed: processed.malformed,
            relevant: processed.relevant,
            merged_unique,
            new_roles: diff.new.len(),
            previously_seen: diff.seen.len(),
            total_seen_all_time: registry.len(),
            sources: processed.sources,
            roles: diff.new,
        })
    }

    async fn save_batches(&self, batches: &[SourceBatch], as_of: NaiveDate) {
        let Some(results) = &self.results else {
            return;
        };

        for batch in batches.iter().filter(|b| !b.is_failed() && !b.replay) {
            let payload = json!({ "roles": batch.candidates });
            match results.save(&batch.label, as_of, &payload).await {
                Ok(path) => debug!(collector = %batch.label, path = %path.display(), "Saved raw batch"),
                Err(e) => warn!(collector = %batch.label, error = %e, "Could not save raw batch"),
            }
        }
    }

    async fn save_summary(&self, summary: &RunSummary) {
        let Some(results) = &self.results else {
            return;
        };

        match results.save("summary", summary.date, summary).await {
            Ok(path) => info!(path = %path.display(), "Saved run summary"),
            Err(e) => warn!(error = %e, "Could not save run summary"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(company: &str, title: &str) -> RawCandidate {
        RawCandidate::new(company, title)
    }

    #[test]
    fn test_process_counts_each_stage() {
        let coordinator = RunCoordinator::new(Vec::new())
            .with_relevance(true, RelevanceClassifier::default(), KnownCompanies::new(["Addepar"]));

        let mut missing_company = RawCandidate::default();
        missing_company.title = Some("VP Sales".into());

        let batches = vec![
            SourceBatch::new(
                "career-pages",
                SearchScope::Broad,
                vec![
                    raw("Addepar", "VP Sales"),
                    raw("Addepar", "Senior Software Engineer"),
                    missing_company,
                ],
            ),
            SourceBatch::new("job-boards", SearchScope::Broad, vec![raw("ADDEPAR", "vp sales")]),
            SourceBatch::failed("news", SearchScope::Broad, "timed out after 600s"),
        ];

        let processed = coordinator.process(batches);

        assert_eq!(processed.collected, 4);
        assert_eq!(processed.malformed, 1);
        assert_eq!(processed.relevant, 2);
        assert_eq!(processed.merged.len(), 1);
        assert_eq!(processed.merged[0].sources, vec!["career-pages", "job-boards"]);
        assert!(processed.sources[2].failed);
        assert_eq!(processed.sources[2].collected, 0);
    }

    #[test]
    fn test_relevance_can_be_disabled() {
        let coordinator = RunCoordinator::new(Vec::new()).with_relevance(
            false,
            RelevanceClassifier::default(),
            KnownCompanies::default(),
        );

        let processed = coordinator.process(vec![SourceBatch::new(
            "boards",
            SearchScope::Broad,
            vec![raw("Acme", "Senior Software Engineer")],
        )]);

        assert_eq!(processed.relevant, 1);
        assert_eq!(processed.merged.len(), 1);
    }
}
