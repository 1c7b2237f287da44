//! Deadline sweep: archive active postings whose application deadline has
//! passed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::domain::ActorIdentity;
use super::lifecycle::TransitionEngine;
use super::store::{NotificationDispatcher, PostingQuery, PostingStore, StoreError};

/// Outcome of one sweep. Partial failure is reported, never raised; retry
/// policy belongs to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Scan-then-transition batch job driving expired postings into `archived`.
pub struct ExpirySweeper<S, D> {
    engine: Arc<TransitionEngine<S, D>>,
}

impl<S, D> ExpirySweeper<S, D>
where
    S: PostingStore + 'static,
    D: NotificationDispatcher + 'static,
{
    pub fn new(engine: Arc<TransitionEngine<S, D>>) -> Self {
        Self { engine }
    }

    /// Archive every active posting whose deadline is before `now`. Each
    /// archive call is independent; one failure never blocks the rest.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let expired = self
            .engine
            .store()
            .find(&PostingQuery::expired_as_of(now))
            .await?;

        let actor = ActorIdentity::system();
        let mut report = SweepReport {
            total: expired.len(),
            ..SweepReport::default()
        };

        for posting in expired {
            match self.engine.archive(&actor, &posting.id).await {
                Ok(_) => report.successful += 1,
                Err(err) => {
                    warn!(job_id = %posting.id, error = %err, "sweep archive failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            "expiry sweep finished"
        );
        Ok(report)
    }

    /// Drive `sweep` on a fixed interval until cancelled. The first tick fires
    /// after one full interval.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // immediate first tick consumed

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if let Err(err) = self.sweep(Utc::now()).await {
                warn!(error = %err, "expiry sweep could not query the store");
            }
        }
    }
}
