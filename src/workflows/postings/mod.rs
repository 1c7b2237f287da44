//! Job-posting lifecycle, targeting, and live projection engine.
//!
//! Everything that moderates a posting lives here: the status state machine
//! (`lifecycle`), the audience-targeting selection algebra (`targeting`), batch
//! reference enrichment (`resolver`), the live moderation/directory projections
//! (`projection`), and the deadline sweep (`sweeper`). Storage and notification
//! transports are consumed through the contracts in `store`.

pub mod domain;
pub mod lifecycle;
pub mod memory;
pub mod projection;
pub mod resolver;
pub mod router;
pub mod store;
pub mod sweeper;
pub mod targeting;

#[cfg(test)]
mod tests;

pub use domain::{
    ActorId, ActorIdentity, Capability, CompanyProfile, JobPosting, JobStatus, LifecycleEvent,
    NewPosting, PostingId, RecruiterProfile, StatusBadge,
};
pub use lifecycle::{TransitionEngine, TransitionError, TransitionKind};
pub use memory::{MemoryPostingStore, MemoryProfileStore};
pub use projection::{
    company_directory, AggregateCounters, DirectoryEntry, FilterCriteria, FilteredView,
    ProjectionHandle, ProjectionService, ProjectionSnapshot, ProjectionState,
};
pub use resolver::{EnrichedPosting, ReferenceResolver};
pub use router::posting_router;
pub use store::{
    DispatchError, NotificationDispatcher, PostingQuery, PostingStore, ProfileStore, StoreError,
    TracingDispatcher,
};
pub use sweeper::{ExpirySweeper, SweepReport};
pub use targeting::{SegmentAxis, SegmentSet, SegmentUniverse, TargetSelection};
