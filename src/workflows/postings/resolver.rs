//! Batch enrichment of postings with their referenced recruiter and company
//! profiles.
//!
//! Lookups run concurrently under a configured bound so a large moderation
//! batch costs roughly one slow lookup, not the sum of all of them. A failed
//! or dangling reference degrades that one record to a null profile; it never
//! fails the batch.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::warn;

use super::domain::{CompanyProfile, JobPosting, RecruiterProfile};
use super::store::ProfileStore;

/// A posting denormalized with its resolved references for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedPosting {
    #[serde(flatten)]
    pub posting: JobPosting,
    pub recruiter: Option<RecruiterProfile>,
    pub company_details: Option<CompanyProfile>,
}

impl EnrichedPosting {
    /// True when a reference this posting carries could not be resolved.
    pub fn resolution_gap(&self) -> bool {
        self.recruiter.is_none()
            || (self.posting.company_id.is_some() && self.company_details.is_none())
    }

    /// Display identity for directory rollups: the resolved company, falling
    /// back to the raw reference, falling back to the owning recruiter.
    pub fn directory_key(&self) -> String {
        if let Some(company) = &self.company_details {
            return company.id.clone();
        }
        if let Some(company_id) = &self.posting.company_id {
            return company_id.clone();
        }
        self.posting.recruiter_id.0.clone()
    }
}

/// Concurrent, bounded, order-preserving reference resolver.
pub struct ReferenceResolver<P> {
    profiles: Arc<P>,
    concurrency: usize,
}

impl<P> ReferenceResolver<P>
where
    P: ProfileStore + 'static,
{
    pub fn new(profiles: Arc<P>, concurrency: usize) -> Self {
        Self {
            profiles,
            concurrency: concurrency.max(1),
        }
    }

    /// Enrich a batch. Output order matches input order; per-record failures
    /// surface as `None` profiles.
    pub async fn enrich(&self, postings: Vec<JobPosting>) -> Vec<EnrichedPosting> {
        stream::iter(postings.into_iter().map(|posting| self.enrich_one(posting)))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn enrich_one(&self, posting: JobPosting) -> EnrichedPosting {
        let recruiter_lookup = self.profiles.recruiter(&posting.recruiter_id);
        let company_lookup = async {
            match &posting.company_id {
                Some(company_id) => self.profiles.company(company_id).await,
                None => Ok(None),
            }
        };
        let (recruiter, company_details) = tokio::join!(recruiter_lookup, company_lookup);

        let recruiter = recruiter.unwrap_or_else(|err| {
            warn!(job_id = %posting.id, error = %err, "recruiter lookup failed");
            None
        });
        let company_details = company_details.unwrap_or_else(|err| {
            warn!(job_id = %posting.id, error = %err, "company lookup failed");
            None
        });

        EnrichedPosting {
            posting,
            recruiter,
            company_details,
        }
    }
}
