mod common;

use std::sync::Arc;

use casale::cache::{CacheStore, CommitHooks, MutationAction, PendingMutation};

use common::{Harness, memory_store, sample_record, sample_records};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn counter_increments_survive_contention() {
    let store = memory_store();
    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..200 {
                    store.incr_counter("invalidations").await.expect("incr");
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("task");
    }

    assert_eq!(store.incr_counter("invalidations").await.expect("incr"), 12_801);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_commits_each_leave_one_event() {
    let harness = Harness::new(memory_store(), sample_records());
    let tasks: Vec<_> = (1..=200)
        .map(|id| {
            let cache = Arc::clone(&harness.cache);
            tokio::spawn(async move {
                let record = sample_record(id, "Austin, TX", 300_000.0);
                let mut hooks = CommitHooks::new();
                hooks.defer(PendingMutation::for_record(&record, MutationAction::Updated));
                hooks
                    .commit_then(async { Ok::<_, ()>(()) }, cache.as_ref())
                    .await
                    .expect("commit succeeds");
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("task");
    }

    let stats = harness.cache.invalidation_stats().await.expect("stats");
    assert_eq!(stats.total_invalidations, 200);
    assert_eq!(stats.recent.len(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_collections_each_add_a_sample() {
    let harness = Harness::new(memory_store(), sample_records());
    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let cache = Arc::clone(&harness.cache);
            tokio::spawn(async move { cache.collect_metrics().await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.expect("task").is_success());
    }

    assert_eq!(harness.cache.metrics_trend().await.data_points, 50);
}
