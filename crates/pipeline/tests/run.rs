mod common;

use collect::{FileCollector, ResultsDir};
use common::{Behavior, StubCollector, candidate, day};
use listings::{KnownCompanies, RawCandidate, RelevanceClassifier, SearchScope};
use pipeline::{PipelineError, RunCoordinator, SourceBatch};
use registry::{RegistryError, RegistryStore};
use std::time::Duration;
use tempfile::tempdir;

fn store_in(dir: &std::path::Path) -> RegistryStore {
    RegistryStore::new(dir.join("registry.log")).with_snapshot(dir.join("seen_roles.json"))
}

#[tokio::test]
async fn two_batches_merge_into_one_new_listing() {
    let temp = tempdir().unwrap();
    let store = store_in(temp.path());

    let mut a = candidate("Addepar", "VP Sales");
    a.url = Some("https://x/1?ref=abc".into());
    let mut b = candidate("addepar", "vp sales");
    b.compensation = Some("$250k".into());

    let coordinator = RunCoordinator::new(Vec::new());
    let batches = vec![
        SourceBatch::new("a", SearchScope::Broad, vec![a]),
        SourceBatch::new("b", SearchScope::Broad, vec![b]),
    ];

    let summary = coordinator
        .run_with_batches(batches.clone(), &store, day(19))
        .await
        .unwrap();

    assert_eq!(summary.merged_unique, 1);
    assert_eq!(summary.new_roles, 1);
    let role = &summary.roles[0];
    assert_eq!(role.company(), "Addepar");
    assert_eq!(role.url.as_deref(), Some("https://x/1"));
    assert_eq!(role.compensation.as_deref(), Some("$250k"));
    assert!(role.is_new);

    let again = coordinator
        .run_with_batches(batches, &store, day(20))
        .await
        .unwrap();

    assert_eq!(again.new_roles, 0);
    assert_eq!(again.previously_seen, 1);
    assert_eq!(again.total_seen_all_time, 1);

    let registry = store.load().await;
    assert_eq!(registry.get("addepar|vp sales").unwrap().first_seen, day(19));
}

#[tokio::test]
async fn failed_collector_degrades_to_empty_batch() {
    let temp = tempdir().unwrap();
    let coordinator = RunCoordinator::new(vec![
        StubCollector::new("career-pages", Behavior::NotFound).shared(),
        StubCollector::new(
            "job-boards",
            Behavior::Return(vec![candidate("Orion", "Head of Growth")]),
        )
        .shared(),
        StubCollector::new("news", Behavior::Panic).shared(),
    ]);

    let summary = coordinator.run(&store_in(temp.path()), day(19)).await.unwrap();

    assert_eq!(summary.new_roles, 1);
    assert_eq!(summary.roles[0].company(), "Orion");
    let failed: Vec<&str> = summary.failed_sources().map(|s| s.label.as_str()).collect();
    assert_eq!(failed, vec!["career-pages", "news"]);
    assert!(summary.sources[2].error.as_deref().unwrap().contains("panicked"));
    assert_eq!(coordinator.metrics().snapshot().collector_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn priority_follows_declared_order_not_completion() {
    let mut slow = candidate("Addepar", "VP Sales");
    slow.location = Some("New York".into());
    let mut fast = candidate("Addepar", "VP Sales");
    fast.location = Some("Remote".into());

    let coordinator = RunCoordinator::new(vec![
        StubCollector::new("career-pages", Behavior::Return(vec![slow]))
            .after(Duration::from_secs(30))
            .shared(),
        StubCollector::new("job-boards", Behavior::Return(vec![fast])).shared(),
    ]);

    let batches = coordinator.collect().await;
    let labels: Vec<&str> = batches.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["career-pages", "job-boards"]);

    let processed = coordinator.process(batches);
    assert_eq!(processed.merged.len(), 1);
    assert_eq!(processed.merged[0].location.as_deref(), Some("New York"));
}

#[tokio::test(start_paused = true)]
async fn slow_collector_times_out() {
    let coordinator = RunCoordinator::new(vec![
        StubCollector::new("hung", Behavior::Return(vec![candidate("Orion", "VP Sales")]))
            .after(Duration::from_secs(3600))
            .shared(),
        StubCollector::new("quick", Behavior::Return(vec![candidate("Addepar", "VP Sales")]))
            .shared(),
    ])
    .with_collector_timeout(Duration::from_secs(10));

    let batches = coordinator.collect().await;

    assert!(batches[0].is_failed());
    assert!(batches[0].error.as_deref().unwrap().contains("timed out"));
    assert_eq!(batches[1].candidates.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_collector_is_retried() {
    let coordinator = RunCoordinator::new(vec![
        StubCollector::new(
            "boards",
            Behavior::RateLimited(2, vec![candidate("Addepar", "VP Sales")]),
        )
        .shared(),
    ]);

    let start = tokio::time::Instant::now();
    let batches = coordinator.collect().await;

    assert!(!batches[0].is_failed());
    assert_eq!(batches[0].candidates.len(), 1);
    assert_eq!(start.elapsed(), Duration::from_secs(2 + 4));
}

#[tokio::test]
async fn company_targeted_scope_skips_domain_check() {
    let coordinator = RunCoordinator::new(Vec::new()).with_relevance(
        true,
        RelevanceClassifier::default(),
        KnownCompanies::default(),
    );
    let roles = vec![candidate("Acme Corp", "Head of Partnerships")];

    let broad = coordinator.process(vec![SourceBatch::new("boards", SearchScope::Broad, roles.clone())]);
    let targeted = coordinator.process(vec![SourceBatch::new(
        "career-pages",
        SearchScope::CompanyTargeted,
        roles,
    )]);

    assert_eq!(broad.relevant, 0);
    assert_eq!(targeted.relevant, 1);
}

#[tokio::test]
async fn unwritable_registry_fails_the_run() {
    let temp = tempdir().unwrap();
    let log = temp.path().join("registry.log");
    std::fs::create_dir_all(&log).unwrap();

    let coordinator = RunCoordinator::new(Vec::new());
    let result = coordinator
        .run_with_batches(
            vec![SourceBatch::new(
                "boards",
                SearchScope::Broad,
                vec![candidate("Addepar", "VP Sales")],
            )],
            &RegistryStore::new(&log),
            day(19),
        )
        .await;

    assert!(matches!(
        result,
        Err(PipelineError::Registry(RegistryError::Unwritable { .. }))
    ));
    assert_eq!(coordinator.metrics().snapshot().runs_failed, 1);
}

#[tokio::test]
async fn saved_batches_replay_in_merge_only_mode() {
    let temp = tempdir().unwrap();
    let results = ResultsDir::new(temp.path().join("results"));

    let first = RunCoordinator::new(vec![
        StubCollector::new(
            "agent2",
            Behavior::Return(vec![candidate("Pontera", "VP Partnerships")]),
        )
        .shared(),
    ])
    .with_results(results.clone());
    first.run(&store_in(temp.path()), day(18)).await.unwrap();

    assert!(results.path_for("agent2", day(18)).exists());
    assert!(results.path_for("summary", day(18)).exists());

    // a fresh registry sees the replayed role as new
    let fresh = tempdir().unwrap();
    let replay = RunCoordinator::new(vec![std::sync::Arc::new(FileCollector::new(
        "career-pages",
        "agent2",
        results.clone(),
    ))])
    .with_results(results.clone());
    let summary = replay.run(&store_in(fresh.path()), day(19)).await.unwrap();

    assert_eq!(summary.new_roles, 1);
    assert_eq!(summary.roles[0].company(), "Pontera");
    // replayed batches are not written back under either name
    assert!(!results.path_for("career-pages", day(19)).exists());
    assert!(!results.path_for("agent2", day(19)).exists());
    assert!(results.path_for("summary", day(19)).exists());
}

#[tokio::test]
async fn malformed_candidates_are_counted() {
    let temp = tempdir().unwrap();
    let mut no_title = RawCandidate::default();
    no_title.company = Some("Addepar".into());

    let summary = RunCoordinator::new(Vec::new())
        .run_with_batches(
            vec![SourceBatch::new("boards", SearchScope::Broad, vec![no_title])],
            &store_in(temp.path()),
            day(19),
        )
        .await
        .unwrap();

    assert_eq!(summary.collected, 1);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.merged_unique, 0);
}
