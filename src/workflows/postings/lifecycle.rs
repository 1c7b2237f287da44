//! The status transition engine.
//!
//! All mutations of a posting's lifecycle flow through here: validation, the
//! compare-and-swap write, audit stamping, and the best-effort notification.
//! Every other component is read-only with respect to postings.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    ActorIdentity, JobPosting, JobStatus, LifecycleEvent, NewPosting, PostingId,
};
use super::store::{NotificationDispatcher, PostingStore, StoreError};
use super::targeting::TargetSelection;

/// The transition a caller requested, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Approve,
    Reject,
    Archive,
}

impl TransitionKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error raised by the transition engine. Variants carry the concrete reason
/// so callers can distinguish stale state from missing permission.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("job posting not found")]
    NotFound,
    #[error("cannot {requested} a {from} posting")]
    InvalidTransition {
        from: JobStatus,
        requested: TransitionKind,
    },
    #[error("not authorized: {0}")]
    Forbidden(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TransitionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

static POSTING_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_posting_id() -> PostingId {
    let id = POSTING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PostingId(format!("job-{id:06}"))
}

/// Service applying lifecycle transitions against the store.
pub struct TransitionEngine<S, D> {
    store: Arc<S>,
    dispatcher: Arc<D>,
}

impl<S, D> TransitionEngine<S, D>
where
    S: PostingStore + 'static,
    D: NotificationDispatcher + 'static,
{
    pub fn new(store: Arc<S>, dispatcher: Arc<D>) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create a draft owned by the acting recruiter.
    pub async fn create_draft(
        &self,
        actor: &ActorIdentity,
        payload: NewPosting,
    ) -> Result<JobPosting, TransitionError> {
        if !actor.can_recruit() {
            return Err(TransitionError::Forbidden(
                "draft creation requires the recruit capability".to_string(),
            ));
        }
        if payload.title.trim().is_empty() {
            return Err(TransitionError::Validation(
                "posting title must not be empty".to_string(),
            ));
        }

        let posting = JobPosting::draft(next_posting_id(), actor.id.clone(), payload, Utc::now());
        let stored = self.store.insert(posting).await?;
        info!(job_id = %stored.id, recruiter = %stored.recruiter_id, "draft created");
        Ok(stored)
    }

    /// Approve a draft and publish it to the supplied audience selection.
    ///
    /// Approval and publication are one transition: the selection is assigned
    /// before the status flips to active, so a selection can never sit on a
    /// draft and an active posting always carries a complete one.
    pub async fn approve(
        &self,
        actor: &ActorIdentity,
        id: &PostingId,
        selection: TargetSelection,
    ) -> Result<JobPosting, TransitionError> {
        if !actor.can_moderate() {
            return Err(TransitionError::Forbidden(
                "approval requires the moderate capability".to_string(),
            ));
        }
        if !selection.is_complete() {
            return Err(TransitionError::Validation(
                "every targeting axis must select at least one segment".to_string(),
            ));
        }

        self.apply(id, TransitionKind::Approve, |mut posting| {
            if posting.status != JobStatus::Draft {
                return Step::Invalid(posting.status);
            }
            let now = Utc::now();
            posting.status = JobStatus::Active;
            posting.targeting = selection.clone();
            posting.approved_at = Some(now);
            posting.approved_by = Some(actor.id.clone());
            posting.posted_at = Some(now);
            posting.posted_by = Some(actor.id.clone());
            posting.updated_at = now;
            Step::Write {
                updated: posting,
                reason: None,
            }
        })
        .await
        .map(ApplyOutcome::into_posting)
    }

    /// Reject a draft with a mandatory reason.
    pub async fn reject(
        &self,
        actor: &ActorIdentity,
        id: &PostingId,
        reason: &str,
    ) -> Result<JobPosting, TransitionError> {
        if !actor.can_moderate() {
            return Err(TransitionError::Forbidden(
                "rejection requires the moderate capability".to_string(),
            ));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TransitionError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }

        let reason = reason.to_string();
        self.apply(id, TransitionKind::Reject, |mut posting| {
            if posting.status != JobStatus::Draft {
                return Step::Invalid(posting.status);
            }
            let now = Utc::now();
            posting.status = JobStatus::Rejected;
            posting.rejected_at = Some(now);
            posting.rejected_by = Some(actor.id.clone());
            posting.rejection_reason = Some(reason.clone());
            posting.updated_at = now;
            Step::Write {
                updated: posting,
                reason: Some(reason.clone()),
            }
        })
        .await
        .map(ApplyOutcome::into_posting)
    }

    /// Archive an active posting. Moderators may archive anything; a recruiter
    /// may archive their own posting. Archiving an already-archived posting
    /// succeeds without touching the record or re-firing notifications.
    pub async fn archive(
        &self,
        actor: &ActorIdentity,
        id: &PostingId,
    ) -> Result<JobPosting, TransitionError> {
        self.apply(id, TransitionKind::Archive, |mut posting| {
            if posting.status == JobStatus::Archived {
                return Step::AlreadyDone(posting);
            }
            if posting.status != JobStatus::Active {
                return Step::Invalid(posting.status);
            }
            if !actor.can_moderate() && actor.id != posting.recruiter_id {
                return Step::Forbidden(
                    "archiving requires the moderate capability or ownership".to_string(),
                );
            }
            let now = Utc::now();
            posting.status = JobStatus::Archived;
            posting.archived_at = Some(now);
            posting.archived_by = Some(actor.id.clone());
            posting.updated_at = now;
            Step::Write {
                updated: posting,
                reason: None,
            }
        })
        .await
        .map(ApplyOutcome::into_posting)
    }

    /// Read-validate-CAS loop shared by the transitions.
    ///
    /// On a CAS conflict the record is re-read and revalidated, so the loser
    /// of a concurrent race observes the new status and gets
    /// `InvalidTransition` instead of silently double-applying.
    async fn apply<F>(
        &self,
        id: &PostingId,
        requested: TransitionKind,
        mut step: F,
    ) -> Result<ApplyOutcome, TransitionError>
    where
        F: FnMut(JobPosting) -> Step,
    {
        loop {
            let current = self
                .store
                .get(id)
                .await?
                .ok_or(TransitionError::NotFound)?;
            let previous_status = current.status;

            match step(current) {
                Step::AlreadyDone(posting) => return Ok(ApplyOutcome::Noop(posting)),
                Step::Invalid(from) => {
                    return Err(TransitionError::InvalidTransition { from, requested })
                }
                Step::Forbidden(message) => return Err(TransitionError::Forbidden(message)),
                Step::Write { updated, reason } => {
                    match self.store.update_if_status(previous_status, updated).await {
                        Ok(stored) => {
                            self.dispatch(&stored, previous_status, reason);
                            // Noop paths above never reach here, so exactly one
                            // notification fires per effective transition.
                            info!(
                                job_id = %stored.id,
                                from = %previous_status,
                                to = %stored.status,
                                transition = %requested,
                                "transition applied"
                            );
                            return Ok(ApplyOutcome::Written(stored));
                        }
                        // Lost the race: revalidate against the fresh record.
                        Err(StoreError::Conflict) => continue,
                        Err(other) => return Err(other.into()),
                    }
                }
            }
        }
    }

    /// Queue exactly one notification for an effective transition. Dispatch
    /// failure is logged and dropped; the status write is the source of truth.
    fn dispatch(&self, posting: &JobPosting, previous_status: JobStatus, reason: Option<String>) {
        let event = LifecycleEvent {
            job_id: posting.id.clone(),
            previous_status,
            new_status: posting.status,
            actor: actor_of(posting),
            reason,
            occurred_at: posting.updated_at,
        };
        if let Err(err) = self.dispatcher.notify(event) {
            warn!(job_id = %posting.id, error = %err, "notification dispatch failed");
        }
    }
}

/// The audit pair stamped by the transition that just ran names the actor.
fn actor_of(posting: &JobPosting) -> super::domain::ActorId {
    let stamped = match posting.status {
        JobStatus::Active => posting.posted_by.clone(),
        JobStatus::Rejected => posting.rejected_by.clone(),
        JobStatus::Archived => posting.archived_by.clone(),
        JobStatus::Draft => None,
    };
    stamped.unwrap_or_else(|| posting.recruiter_id.clone())
}

enum Step {
    Write {
        updated: JobPosting,
        reason: Option<String>,
    },
    AlreadyDone(JobPosting),
    Invalid(JobStatus),
    Forbidden(String),
}

enum ApplyOutcome {
    Written(JobPosting),
    Noop(JobPosting),
}

impl ApplyOutcome {
    fn into_posting(self) -> JobPosting {
        match self {
            Self::Written(posting) | Self::Noop(posting) => posting,
        }
    }
}
