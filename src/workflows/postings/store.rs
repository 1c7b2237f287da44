//! Contracts the engine needs from the document store and the notification
//! transport. The store itself is a collaborator; only the operations below
//! are consumed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use super::domain::{
    ActorId, CompanyProfile, JobPosting, JobStatus, LifecycleEvent, PostingId, RecruiterProfile,
};

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists or was concurrently updated")]
    Conflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Equality/range filters the core requires from the store.
///
/// Results are always ordered by `created_at` descending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingQuery {
    pub status: Option<JobStatus>,
    pub recruiter_id: Option<ActorId>,
    pub company_id: Option<String>,
    pub deadline_before: Option<DateTime<Utc>>,
}

impl PostingQuery {
    /// The unfiltered moderation-queue query.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn for_recruiter(recruiter_id: ActorId) -> Self {
        Self {
            recruiter_id: Some(recruiter_id),
            ..Self::default()
        }
    }

    /// Active postings whose application deadline has passed.
    pub fn expired_as_of(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Active),
            deadline_before: Some(now),
            ..Self::default()
        }
    }

    /// Pure predicate form of the filter, shared by store implementations.
    pub fn matches(&self, posting: &JobPosting) -> bool {
        if let Some(status) = self.status {
            if posting.status != status {
                return false;
            }
        }
        if let Some(recruiter_id) = &self.recruiter_id {
            if &posting.recruiter_id != recruiter_id {
                return false;
            }
        }
        if let Some(company_id) = &self.company_id {
            if posting.company_id.as_deref() != Some(company_id.as_str()) {
                return false;
            }
        }
        if let Some(cutoff) = self.deadline_before {
            match posting.application_deadline {
                Some(deadline) if deadline < cutoff => {}
                _ => return false,
            }
        }
        true
    }
}

/// Typed operations against the posting collection.
#[async_trait]
pub trait PostingStore: Send + Sync {
    async fn get(&self, id: &PostingId) -> Result<Option<JobPosting>, StoreError>;

    async fn find(&self, query: &PostingQuery) -> Result<Vec<JobPosting>, StoreError>;

    async fn insert(&self, posting: JobPosting) -> Result<JobPosting, StoreError>;

    /// Compare-and-swap write: persist `updated` only while the stored record's
    /// status still equals `expected`. Returns `Conflict` when another actor
    /// won the race, so callers can revalidate against the fresh record.
    async fn update_if_status(
        &self,
        expected: JobStatus,
        updated: JobPosting,
    ) -> Result<JobPosting, StoreError>;

    /// Change subscription yielding the full current result set for `query`
    /// on every underlying mutation. Receivers coalesce to the latest set.
    async fn subscribe(
        &self,
        query: PostingQuery,
    ) -> Result<watch::Receiver<Vec<JobPosting>>, StoreError>;
}

/// Foreign-reference lookups used by the resolver. Dangling references are
/// `Ok(None)`, never an error.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn recruiter(&self, id: &ActorId) -> Result<Option<RecruiterProfile>, StoreError>;

    async fn company(&self, id: &str) -> Result<Option<CompanyProfile>, StoreError>;
}

/// Fire-and-forget dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Outbound lifecycle-event hook. `notify` enqueues and returns; delivery is
/// the transport's problem and a failure never rolls back a transition.
pub trait NotificationDispatcher: Send + Sync {
    fn notify(&self, event: LifecycleEvent) -> Result<(), DispatchError>;
}

/// Dispatcher that writes lifecycle events to the log. Used by the serve and
/// demo commands when no real transport is wired in.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TracingDispatcher;

impl NotificationDispatcher for TracingDispatcher {
    fn notify(&self, event: LifecycleEvent) -> Result<(), DispatchError> {
        info!(
            job_id = %event.job_id,
            from = %event.previous_status,
            to = %event.new_status,
            actor = %event.actor,
            "lifecycle event"
        );
        Ok(())
    }
}
