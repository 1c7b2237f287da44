//! Shared fixtures and fakes for the posting workflow tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use crate::workflows::postings::domain::{
    ActorId, ActorIdentity, CompanyProfile, JobPosting, JobStatus, LifecycleEvent, NewPosting,
    PostingId, RecruiterProfile,
};
use crate::workflows::postings::lifecycle::TransitionEngine;
use crate::workflows::postings::memory::{MemoryPostingStore, MemoryProfileStore};
use crate::workflows::postings::store::{
    DispatchError, NotificationDispatcher, PostingQuery, PostingStore, ProfileStore, StoreError,
};
use crate::workflows::postings::targeting::{SegmentSet, TargetSelection};

pub fn recruiter() -> ActorIdentity {
    ActorIdentity::recruiter("rec-001")
}

pub fn other_recruiter() -> ActorIdentity {
    ActorIdentity::recruiter("rec-002")
}

pub fn moderator() -> ActorIdentity {
    ActorIdentity::moderator("mod-001")
}

pub fn powerless() -> ActorIdentity {
    ActorIdentity {
        id: ActorId("nobody".to_string()),
        capabilities: BTreeSet::new(),
    }
}

pub fn new_posting(title: &str) -> NewPosting {
    NewPosting {
        title: title.to_string(),
        company_id: Some("acme".to_string()),
        ..NewPosting::default()
    }
}

pub fn posting_with_deadline(title: &str, deadline: DateTime<Utc>) -> NewPosting {
    NewPosting {
        application_deadline: Some(deadline),
        ..new_posting(title)
    }
}

pub fn past_deadline() -> DateTime<Utc> {
    Utc::now() - Duration::days(2)
}

pub fn future_deadline() -> DateTime<Utc> {
    Utc::now() + Duration::days(30)
}

/// Selection targeting all schools, one batch, one center.
pub fn complete_selection() -> TargetSelection {
    TargetSelection::new(
        SegmentSet::All,
        SegmentSet::codes(["23-27"]),
        SegmentSet::codes(["BANGALORE"]),
    )
}

pub fn incomplete_selection() -> TargetSelection {
    TargetSelection::new(SegmentSet::All, SegmentSet::empty(), SegmentSet::All)
}

/// Dispatcher fake recording every event it is handed.
#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingDispatcher {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().expect("event lock poisoned").clone()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn notify(&self, event: LifecycleEvent) -> Result<(), DispatchError> {
        self.events
            .lock()
            .expect("event lock poisoned")
            .push(event);
        Ok(())
    }
}

/// Dispatcher fake whose transport is always down.
#[derive(Default)]
pub struct FailingDispatcher;

impl NotificationDispatcher for FailingDispatcher {
    fn notify(&self, _event: LifecycleEvent) -> Result<(), DispatchError> {
        Err(DispatchError::Transport("queue offline".to_string()))
    }
}

pub type TestEngine = TransitionEngine<MemoryPostingStore, RecordingDispatcher>;

pub fn build_engine() -> (
    Arc<TestEngine>,
    Arc<MemoryPostingStore>,
    Arc<RecordingDispatcher>,
) {
    let store = Arc::new(MemoryPostingStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let engine = Arc::new(TransitionEngine::new(store.clone(), dispatcher.clone()));
    (engine, store, dispatcher)
}

/// Create a draft and approve it so tests can start from an active posting.
pub async fn active_posting(engine: &TestEngine, payload: NewPosting) -> JobPosting {
    let draft = engine
        .create_draft(&recruiter(), payload)
        .await
        .expect("draft created");
    engine
        .approve(&moderator(), &draft.id, complete_selection())
        .await
        .expect("draft approved")
}

/// Posting store wrapper that fails the CAS write for selected ids.
pub struct FlakyPostingStore {
    inner: MemoryPostingStore,
    fail_updates_for: Mutex<BTreeSet<PostingId>>,
}

impl FlakyPostingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryPostingStore::new(),
            fail_updates_for: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn fail_updates_for(&self, id: PostingId) {
        self.fail_updates_for
            .lock()
            .expect("fail set lock poisoned")
            .insert(id);
    }
}

#[async_trait]
impl PostingStore for FlakyPostingStore {
    async fn get(&self, id: &PostingId) -> Result<Option<JobPosting>, StoreError> {
        self.inner.get(id).await
    }

    async fn find(&self, query: &PostingQuery) -> Result<Vec<JobPosting>, StoreError> {
        self.inner.find(query).await
    }

    async fn insert(&self, posting: JobPosting) -> Result<JobPosting, StoreError> {
        self.inner.insert(posting).await
    }

    async fn update_if_status(
        &self,
        expected: JobStatus,
        updated: JobPosting,
    ) -> Result<JobPosting, StoreError> {
        let denied = self
            .fail_updates_for
            .lock()
            .expect("fail set lock poisoned")
            .contains(&updated.id);
        if denied {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }
        self.inner.update_if_status(expected, updated).await
    }

    async fn subscribe(
        &self,
        query: PostingQuery,
    ) -> Result<watch::Receiver<Vec<JobPosting>>, StoreError> {
        self.inner.subscribe(query).await
    }
}

/// Profile store wrapper that fails recruiter lookups for selected ids.
pub struct FlakyProfileStore {
    inner: MemoryProfileStore,
    fail_recruiters: BTreeSet<ActorId>,
}

impl FlakyProfileStore {
    pub fn new(fail_recruiters: impl IntoIterator<Item = ActorId>) -> Self {
        Self {
            inner: MemoryProfileStore::new(),
            fail_recruiters: fail_recruiters.into_iter().collect(),
        }
    }

    pub fn put_recruiter(&self, profile: RecruiterProfile) {
        self.inner.put_recruiter(profile);
    }

    pub fn put_company(&self, profile: CompanyProfile) {
        self.inner.put_company(profile);
    }
}

#[async_trait]
impl ProfileStore for FlakyProfileStore {
    async fn recruiter(&self, id: &ActorId) -> Result<Option<RecruiterProfile>, StoreError> {
        if self.fail_recruiters.contains(id) {
            return Err(StoreError::Unavailable("profile backend down".to_string()));
        }
        self.inner.recruiter(id).await
    }

    async fn company(&self, id: &str) -> Result<Option<CompanyProfile>, StoreError> {
        self.inner.company(id).await
    }
}

/// Profile store whose lookups dawdle long enough to still be in flight when
/// a test tears the consumer down. Counts only lookups that ran to completion.
pub struct StallingProfileStore {
    delay: StdDuration,
    completed: AtomicUsize,
}

impl StallingProfileStore {
    pub fn new(delay: StdDuration) -> Self {
        Self {
            delay,
            completed: AtomicUsize::new(0),
        }
    }

    pub fn completed_lookups(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for StallingProfileStore {
    async fn recruiter(&self, _id: &ActorId) -> Result<Option<RecruiterProfile>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    async fn company(&self, _id: &str) -> Result<Option<CompanyProfile>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

pub fn seeded_profiles() -> MemoryProfileStore {
    let profiles = MemoryProfileStore::new();
    profiles.put_recruiter(RecruiterProfile {
        id: ActorId("rec-001".to_string()),
        name: "Asha Nair".to_string(),
        email: Some("asha@acme.example".to_string()),
    });
    profiles.put_recruiter(RecruiterProfile {
        id: ActorId("rec-002".to_string()),
        name: "Vikram Rao".to_string(),
        email: None,
    });
    profiles.put_company(CompanyProfile {
        id: "acme".to_string(),
        name: "Acme Corp".to_string(),
        website: Some("https://acme.example".to_string()),
    });
    profiles
}
