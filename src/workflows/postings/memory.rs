//! In-memory store implementations for the service, demos, and tests.
//!
//! Not durable: data is lost on restart. The posting store keeps one watch
//! channel per subscription and republishes each subscriber's full result set
//! after every mutation, which is exactly the change-subscription contract the
//! projection service consumes.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::watch;

use super::domain::{ActorId, CompanyProfile, JobPosting, JobStatus, PostingId, RecruiterProfile};
use super::store::{PostingQuery, PostingStore, ProfileStore, StoreError};

struct QueryWatcher {
    query: PostingQuery,
    tx: watch::Sender<Vec<JobPosting>>,
}

/// In-memory posting collection with change subscriptions.
#[derive(Default)]
pub struct MemoryPostingStore {
    postings: RwLock<HashMap<PostingId, JobPosting>>,
    watchers: Mutex<Vec<QueryWatcher>>,
}

impl MemoryPostingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posting_count(&self) -> usize {
        self.postings.read().expect("posting lock poisoned").len()
    }

    fn results_for(&self, query: &PostingQuery) -> Vec<JobPosting> {
        let postings = self.postings.read().expect("posting lock poisoned");
        let mut results: Vec<JobPosting> = postings
            .values()
            .filter(|posting| query.matches(posting))
            .cloned()
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        results
    }

    /// Recompute and push every live subscriber's result set. Subscribers whose
    /// receivers are gone are pruned on the way through.
    fn publish(&self) {
        let mut watchers = self.watchers.lock().expect("watcher lock poisoned");
        watchers.retain(|watcher| !watcher.tx.is_closed());
        for watcher in watchers.iter() {
            let results = self.results_for(&watcher.query);
            watcher.tx.send_if_modified(|current| {
                if *current == results {
                    false
                } else {
                    *current = results;
                    true
                }
            });
        }
    }
}

#[async_trait]
impl PostingStore for MemoryPostingStore {
    async fn get(&self, id: &PostingId) -> Result<Option<JobPosting>, StoreError> {
        let postings = self.postings.read().expect("posting lock poisoned");
        Ok(postings.get(id).cloned())
    }

    async fn find(&self, query: &PostingQuery) -> Result<Vec<JobPosting>, StoreError> {
        Ok(self.results_for(query))
    }

    async fn insert(&self, mut posting: JobPosting) -> Result<JobPosting, StoreError> {
        // Legacy records may arrive with flags that disagree with their
        // status; the status wins on the way in.
        posting.reconcile_flags();
        {
            let mut postings = self.postings.write().expect("posting lock poisoned");
            if postings.contains_key(&posting.id) {
                return Err(StoreError::Conflict);
            }
            postings.insert(posting.id.clone(), posting.clone());
        }
        self.publish();
        Ok(posting)
    }

    async fn update_if_status(
        &self,
        expected: JobStatus,
        mut updated: JobPosting,
    ) -> Result<JobPosting, StoreError> {
        updated.reconcile_flags();
        {
            let mut postings = self.postings.write().expect("posting lock poisoned");
            let current = postings.get(&updated.id).ok_or(StoreError::NotFound)?;
            if current.status != expected {
                return Err(StoreError::Conflict);
            }
            postings.insert(updated.id.clone(), updated.clone());
        }
        self.publish();
        Ok(updated)
    }

    async fn subscribe(
        &self,
        query: PostingQuery,
    ) -> Result<watch::Receiver<Vec<JobPosting>>, StoreError> {
        let initial = self.results_for(&query);
        let (tx, rx) = watch::channel(initial);
        self.watchers
            .lock()
            .expect("watcher lock poisoned")
            .push(QueryWatcher { query, tx });
        Ok(rx)
    }
}

/// In-memory recruiter/company reference store.
#[derive(Default)]
pub struct MemoryProfileStore {
    recruiters: RwLock<HashMap<ActorId, RecruiterProfile>>,
    companies: RwLock<HashMap<String, CompanyProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_recruiter(&self, profile: RecruiterProfile) {
        self.recruiters
            .write()
            .expect("recruiter lock poisoned")
            .insert(profile.id.clone(), profile);
    }

    pub fn put_company(&self, profile: CompanyProfile) {
        self.companies
            .write()
            .expect("company lock poisoned")
            .insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn recruiter(&self, id: &ActorId) -> Result<Option<RecruiterProfile>, StoreError> {
        let recruiters = self.recruiters.read().expect("recruiter lock poisoned");
        Ok(recruiters.get(id).cloned())
    }

    async fn company(&self, id: &str) -> Result<Option<CompanyProfile>, StoreError> {
        let companies = self.companies.read().expect("company lock poisoned");
        Ok(companies.get(id).cloned())
    }
}
