use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::common::{
    active_posting, build_engine, complete_selection, future_deadline, moderator, new_posting,
    past_deadline, posting_with_deadline, recruiter, RecordingDispatcher, FlakyPostingStore,
};
use crate::workflows::postings::domain::{ActorId, JobStatus};
use crate::workflows::postings::lifecycle::TransitionEngine;
use crate::workflows::postings::store::{PostingQuery, PostingStore};
use crate::workflows::postings::sweeper::{ExpirySweeper, SweepReport};

#[tokio::test]
async fn sweep_archives_only_expired_active_postings() {
    let (engine, store, _) = build_engine();

    let expired_a =
        active_posting(&engine, posting_with_deadline("Backend Engineer", past_deadline())).await;
    let expired_b =
        active_posting(&engine, posting_with_deadline("Data Analyst", past_deadline())).await;
    let open =
        active_posting(&engine, posting_with_deadline("QA Engineer", future_deadline())).await;
    let undated = active_posting(&engine, new_posting("Designer")).await;
    // A draft past its deadline is not swept; only active postings expire.
    engine
        .create_draft(
            &recruiter(),
            posting_with_deadline("Intern", past_deadline()),
        )
        .await
        .expect("draft created");

    let report = engine_sweep(&engine).await;
    assert_eq!(
        report,
        SweepReport {
            total: 2,
            successful: 2,
            failed: 0,
        }
    );

    for id in [&expired_a.id, &expired_b.id] {
        let posting = store
            .get(id)
            .await
            .expect("store reachable")
            .expect("posting stored");
        assert_eq!(posting.status, JobStatus::Archived);
        assert_eq!(posting.archived_by, Some(ActorId("system".to_string())));
    }
    for id in [&open.id, &undated.id] {
        let posting = store
            .get(id)
            .await
            .expect("store reachable")
            .expect("posting stored");
        assert_eq!(posting.status, JobStatus::Active);
    }
}

#[tokio::test]
async fn sweep_on_empty_collection_reports_zeroes() {
    let (engine, _, _) = build_engine();
    let report = engine_sweep(&engine).await;
    assert_eq!(report, SweepReport::default());
}

#[tokio::test]
async fn one_failed_archive_does_not_block_the_rest() {
    let store = Arc::new(FlakyPostingStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let engine = Arc::new(TransitionEngine::new(store.clone(), dispatcher));

    let stuck = engine
        .create_draft(
            &recruiter(),
            posting_with_deadline("Backend Engineer", past_deadline()),
        )
        .await
        .expect("draft created");
    let healthy = engine
        .create_draft(
            &recruiter(),
            posting_with_deadline("Data Analyst", past_deadline()),
        )
        .await
        .expect("draft created");
    engine
        .approve(&moderator(), &stuck.id, complete_selection())
        .await
        .expect("approved");
    engine
        .approve(&moderator(), &healthy.id, complete_selection())
        .await
        .expect("approved");

    store.fail_updates_for(stuck.id.clone());

    let sweeper = ExpirySweeper::new(engine.clone());
    let report = sweeper.sweep(Utc::now()).await.expect("sweep runs");

    assert_eq!(
        report,
        SweepReport {
            total: 2,
            successful: 1,
            failed: 1,
        }
    );

    let still_active = store
        .get(&stuck.id)
        .await
        .expect("store reachable")
        .expect("posting stored");
    assert_eq!(still_active.status, JobStatus::Active);
    let archived = store
        .get(&healthy.id)
        .await
        .expect("store reachable")
        .expect("posting stored");
    assert_eq!(archived.status, JobStatus::Archived);
}

#[tokio::test]
async fn sweep_is_idempotent_across_runs() {
    let (engine, _, _) = build_engine();
    active_posting(&engine, posting_with_deadline("Backend Engineer", past_deadline())).await;

    let first = engine_sweep(&engine).await;
    assert_eq!(first.successful, 1);

    // Already archived, so the expiry query no longer matches it.
    let second = engine_sweep(&engine).await;
    assert_eq!(second, SweepReport::default());
}

#[tokio::test]
async fn run_loop_sweeps_until_cancelled() {
    let (engine, store, _) = build_engine();
    let expired =
        active_posting(&engine, posting_with_deadline("Backend Engineer", past_deadline())).await;

    let sweeper = Arc::new(ExpirySweeper::new(engine));
    let cancel = CancellationToken::new();
    let task = {
        let sweeper = sweeper.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { sweeper.run(Duration::from_millis(20), cancel).await })
    };

    timeout(Duration::from_secs(5), async {
        loop {
            let posting = store
                .get(&expired.id)
                .await
                .expect("store reachable")
                .expect("posting stored");
            if posting.status == JobStatus::Archived {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("loop archives the expired posting");

    cancel.cancel();
    timeout(Duration::from_secs(5), task)
        .await
        .expect("loop exits after cancellation")
        .expect("sweeper task completes");

    assert_eq!(
        store
            .find(&PostingQuery::with_status(JobStatus::Archived))
            .await
            .expect("store reachable")
            .len(),
        1
    );
}

async fn engine_sweep(engine: &Arc<super::common::TestEngine>) -> SweepReport {
    ExpirySweeper::new(engine.clone())
        .sweep(Utc::now())
        .await
        .expect("sweep runs")
}
