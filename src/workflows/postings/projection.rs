//! Live projections over the posting collection.
//!
//! One long-lived store subscription per filter configuration feeds a
//! sequence-tagged enrich-and-publish loop. Consumers (moderation queue,
//! company directory, counters) read coherent snapshots from a watch channel;
//! an enrichment result is only published while it is still the latest
//! requested, so a slow batch can never overwrite a newer one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::domain::{JobPosting, JobStatus};
use super::resolver::{EnrichedPosting, ReferenceResolver};
use super::store::{PostingQuery, PostingStore, ProfileStore, StoreError};

const RESUBSCRIBE_BACKOFF_INITIAL: Duration = Duration::from_millis(200);
const RESUBSCRIBE_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Derived status counters, recomputed from scratch on every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateCounters {
    pub total: usize,
    pub by_status: BTreeMap<JobStatus, usize>,
}

impl AggregateCounters {
    pub fn tally(postings: &[EnrichedPosting]) -> Self {
        let mut by_status: BTreeMap<JobStatus, usize> = JobStatus::ordered()
            .into_iter()
            .map(|status| (status, 0))
            .collect();
        for enriched in postings {
            *by_status.entry(enriched.posting.status).or_default() += 1;
        }
        Self {
            total: postings.len(),
            by_status,
        }
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Invariant checked by tests: the total always equals the sum of the
    /// per-status counts.
    pub fn is_consistent(&self) -> bool {
        self.total == self.by_status.values().sum::<usize>()
    }
}

/// One coherent published projection of the underlying collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionSnapshot {
    pub sequence: u64,
    pub postings: Vec<EnrichedPosting>,
    pub counters: AggregateCounters,
    pub produced_at: DateTime<Utc>,
}

impl ProjectionSnapshot {
    fn initial() -> Self {
        Self {
            sequence: 0,
            postings: Vec::new(),
            counters: AggregateCounters::tally(&[]),
            produced_at: Utc::now(),
        }
    }
}

/// Directory rollup: one entry per resolved company identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryEntry {
    pub key: String,
    pub company_name: Option<String>,
    pub total_job_postings: usize,
    pub last_job_posted_at: Option<DateTime<Utc>>,
}

/// Collapse a snapshot into the recruiter directory, keyed by resolved
/// company identity. Pure; recomputed on every snapshot, never persisted.
pub fn company_directory(snapshot: &ProjectionSnapshot) -> Vec<DirectoryEntry> {
    let mut entries: BTreeMap<String, DirectoryEntry> = BTreeMap::new();
    for enriched in &snapshot.postings {
        let key = enriched.directory_key();
        let posted_marker = enriched
            .posting
            .posted_at
            .unwrap_or(enriched.posting.created_at);
        let entry = entries.entry(key.clone()).or_insert_with(|| DirectoryEntry {
            key,
            company_name: enriched
                .company_details
                .as_ref()
                .map(|company| company.name.clone()),
            total_job_postings: 0,
            last_job_posted_at: None,
        });
        entry.total_job_postings += 1;
        if entry
            .last_job_posted_at
            .map(|latest| posted_marker > latest)
            .unwrap_or(true)
        {
            entry.last_job_posted_at = Some(posted_marker);
        }
        if entry.company_name.is_none() {
            entry.company_name = enriched
                .company_details
                .as_ref()
                .map(|company| company.name.clone());
        }
    }
    entries.into_values().collect()
}

/// Client-visible search and range filters, applied to the enriched
/// projection rather than pushed to the store query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub search: Option<String>,
    pub min_postings: Option<usize>,
}

impl FilterCriteria {
    fn matches_posting(&self, enriched: &EnrichedPosting) -> bool {
        let Some(needle) = &self.search else {
            return true;
        };
        let needle = needle.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let posting = &enriched.posting;
        posting.title.to_lowercase().contains(&needle)
            || posting.id.0.to_lowercase().contains(&needle)
            || enriched
                .recruiter
                .as_ref()
                .is_some_and(|recruiter| recruiter.name.to_lowercase().contains(&needle))
            || enriched
                .company_details
                .as_ref()
                .is_some_and(|company| company.name.to_lowercase().contains(&needle))
    }

    fn matches_directory(&self, entry: &DirectoryEntry) -> bool {
        if let Some(min) = self.min_postings {
            if entry.total_job_postings < min {
                return false;
            }
        }
        let Some(needle) = &self.search else {
            return true;
        };
        let needle = needle.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        entry.key.to_lowercase().contains(&needle)
            || entry
                .company_name
                .as_ref()
                .is_some_and(|name| name.to_lowercase().contains(&needle))
    }
}

/// The fully derived view state: a referentially transparent function of
/// `(snapshot, criteria)`. Consumers hold the inputs, never this output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionState {
    pub sequence: u64,
    pub queue: Vec<EnrichedPosting>,
    pub directory: Vec<DirectoryEntry>,
    pub counters: AggregateCounters,
}

impl ProjectionState {
    pub fn derive(snapshot: &ProjectionSnapshot, criteria: &FilterCriteria) -> Self {
        let queue = snapshot
            .postings
            .iter()
            .filter(|enriched| criteria.matches_posting(enriched))
            .cloned()
            .collect();
        let directory = company_directory(snapshot)
            .into_iter()
            .filter(|entry| criteria.matches_directory(entry))
            .collect();
        Self {
            sequence: snapshot.sequence,
            queue,
            directory,
            // Counters describe the whole underlying snapshot, not the
            // filtered view.
            counters: snapshot.counters.clone(),
        }
    }
}

/// Builder for live projections over a posting store.
pub struct ProjectionService<S, P> {
    store: Arc<S>,
    resolver: Arc<ReferenceResolver<P>>,
}

impl<S, P> ProjectionService<S, P>
where
    S: PostingStore + 'static,
    P: ProfileStore + Send + Sync + 'static,
{
    pub fn new(store: Arc<S>, resolver: Arc<ReferenceResolver<P>>) -> Self {
        Self { store, resolver }
    }

    /// Start a long-lived projection for one filter configuration.
    pub async fn project(&self, query: PostingQuery) -> Result<ProjectionHandle, StoreError> {
        let raw_rx = self.store.subscribe(query.clone()).await?;
        let (tx, snapshots) = watch::channel(ProjectionSnapshot::initial());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_projection(
            self.store.clone(),
            self.resolver.clone(),
            query,
            raw_rx,
            tx,
            cancel.clone(),
        ));
        Ok(ProjectionHandle {
            snapshots,
            cancel,
            task,
        })
    }
}

/// Handle to a running projection. Dropping it without `shutdown` leaves the
/// background task running until the store goes away; prefer `shutdown`.
pub struct ProjectionHandle {
    snapshots: watch::Receiver<ProjectionSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ProjectionHandle {
    pub fn subscribe(&self) -> watch::Receiver<ProjectionSnapshot> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> ProjectionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Spin up a debounced filtered view over this projection.
    pub fn filtered_view(&self, debounce: Duration) -> FilteredView {
        let snapshots = self.snapshots.clone();
        let initial = ProjectionState::derive(&snapshots.borrow().clone(), &FilterCriteria::default());
        let (state_tx, states) = watch::channel(initial);
        let (criteria_tx, criteria_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_filtered_view(
            snapshots,
            criteria_rx,
            state_tx,
            debounce,
            cancel.clone(),
        ));
        FilteredView {
            states,
            criteria_tx,
            cancel,
            task,
        }
    }

    /// Stop listening and release in-flight enrichment work.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// A consumer-facing view with debounced filter criteria.
pub struct FilteredView {
    states: watch::Receiver<ProjectionState>,
    criteria_tx: mpsc::UnboundedSender<FilterCriteria>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl FilteredView {
    pub fn subscribe(&self) -> watch::Receiver<ProjectionState> {
        self.states.clone()
    }

    pub fn latest(&self) -> ProjectionState {
        self.states.borrow().clone()
    }

    /// Queue new filter criteria; applied after the quiet period elapses.
    pub fn set_criteria(&self, criteria: FilterCriteria) {
        let _ = self.criteria_tx.send(criteria);
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

async fn run_projection<S, P>(
    store: Arc<S>,
    resolver: Arc<ReferenceResolver<P>>,
    query: PostingQuery,
    mut raw_rx: watch::Receiver<Vec<JobPosting>>,
    tx: watch::Sender<ProjectionSnapshot>,
    cancel: CancellationToken,
) where
    S: PostingStore + 'static,
    P: ProfileStore + Send + Sync + 'static,
{
    let latest_requested = Arc::new(AtomicU64::new(0));
    let mut sequence: u64 = 0;

    loop {
        let batch = raw_rx.borrow_and_update().clone();
        sequence += 1;
        latest_requested.store(sequence, Ordering::Release);
        spawn_enrichment(
            resolver.clone(),
            tx.clone(),
            latest_requested.clone(),
            sequence,
            batch,
            cancel.clone(),
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = raw_rx.changed() => {
                if changed.is_ok() {
                    continue;
                }
                // Subscription lost; resubscribe with backoff rather than die.
                match resubscribe(&store, &query, &cancel).await {
                    Some(rx) => raw_rx = rx,
                    None => return,
                }
            }
        }
    }
}

/// Enrich one raw batch off the listening loop. The result is published only
/// while it is still the newest requested sequence (last-snapshot-wins).
/// Cancellation drops the in-flight lookups instead of letting them run out.
fn spawn_enrichment<P>(
    resolver: Arc<ReferenceResolver<P>>,
    tx: watch::Sender<ProjectionSnapshot>,
    latest_requested: Arc<AtomicU64>,
    sequence: u64,
    batch: Vec<JobPosting>,
    cancel: CancellationToken,
) where
    P: ProfileStore + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let postings = tokio::select! {
            _ = cancel.cancelled() => return,
            postings = resolver.enrich(batch) => postings,
        };
        if latest_requested.load(Ordering::Acquire) != sequence {
            debug!(sequence, "discarding stale enrichment result");
            return;
        }
        let counters = AggregateCounters::tally(&postings);
        let snapshot = ProjectionSnapshot {
            sequence,
            postings,
            counters,
            produced_at: Utc::now(),
        };
        // Monotonic publish: even if a newer snapshot squeaked in between the
        // check above and this send, the older result is dropped.
        tx.send_if_modified(|current| {
            if current.sequence < snapshot.sequence {
                *current = snapshot;
                true
            } else {
                false
            }
        });
    });
}

async fn resubscribe<S>(
    store: &Arc<S>,
    query: &PostingQuery,
    cancel: &CancellationToken,
) -> Option<watch::Receiver<Vec<JobPosting>>>
where
    S: PostingStore + 'static,
{
    let mut backoff = RESUBSCRIBE_BACKOFF_INITIAL;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(backoff) => {}
        }
        match store.subscribe(query.clone()).await {
            Ok(rx) => return Some(rx),
            Err(err) => {
                warn!(error = %err, "projection resubscribe failed; backing off");
                backoff = (backoff * 2).min(RESUBSCRIBE_BACKOFF_MAX);
            }
        }
    }
}

async fn run_filtered_view(
    mut snapshots: watch::Receiver<ProjectionSnapshot>,
    mut criteria_rx: mpsc::UnboundedReceiver<FilterCriteria>,
    tx: watch::Sender<ProjectionState>,
    debounce: Duration,
    cancel: CancellationToken,
) {
    let mut criteria = FilterCriteria::default();
    let mut pending: Option<FilterCriteria> = None;
    // Fixed deadline: only a criteria arrival moves it, so snapshot churn
    // cannot starve a pending change.
    let mut apply_at = Instant::now();

    loop {
        let debounce_armed = pending.is_some();
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return;
                }
                // Snapshot changes are never debounced; only criteria are.
                let snapshot = snapshots.borrow_and_update().clone();
                tx.send_replace(ProjectionState::derive(&snapshot, &criteria));
            }
            next = criteria_rx.recv() => {
                match next {
                    // Restart the quiet period on every keystroke-level change.
                    Some(next) => {
                        pending = Some(next);
                        apply_at = Instant::now() + debounce;
                    }
                    None => return,
                }
            }
            _ = sleep_until(apply_at), if debounce_armed => {
                if let Some(next) = pending.take() {
                    criteria = next;
                    let snapshot = snapshots.borrow().clone();
                    tx.send_replace(ProjectionState::derive(&snapshot, &criteria));
                }
            }
        }
    }
}
