use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::targeting::TargetSelection;

/// Identifier wrapper for job postings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostingId(pub String);

impl fmt::Display for PostingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for acting users (recruiters, moderators, the sweeper).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capabilities carried by a caller-supplied identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Create drafts and archive one's own active postings.
    Recruit,
    /// Approve, reject, and archive any posting.
    Moderate,
}

/// Caller-supplied identity attached to every mutating call.
///
/// Authentication is a collaborator concern; the engine only checks capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorIdentity {
    pub id: ActorId,
    pub capabilities: BTreeSet<Capability>,
}

impl ActorIdentity {
    pub fn recruiter(id: impl Into<String>) -> Self {
        Self {
            id: ActorId(id.into()),
            capabilities: BTreeSet::from([Capability::Recruit]),
        }
    }

    pub fn moderator(id: impl Into<String>) -> Self {
        Self {
            id: ActorId(id.into()),
            capabilities: BTreeSet::from([Capability::Recruit, Capability::Moderate]),
        }
    }

    /// Reserved identity used by the expiry sweeper's archive transitions.
    pub fn system() -> Self {
        Self::moderator("system")
    }

    pub fn can_moderate(&self) -> bool {
        self.capabilities.contains(&Capability::Moderate)
    }

    pub fn can_recruit(&self) -> bool {
        self.capabilities.contains(&Capability::Recruit) || self.can_moderate()
    }
}

/// Lifecycle status of a posting. The sole source of truth for liveness;
/// `is_active`/`is_posted` are always derived from it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Draft,
    Active,
    Rejected,
    Archived,
}

impl JobStatus {
    pub const fn ordered() -> [Self; 4] {
        [Self::Draft, Self::Active, Self::Rejected, Self::Archived]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Active => "Active",
            Self::Rejected => "Rejected",
            Self::Archived => "Archived",
        }
    }

    /// Students can see and apply to the posting.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// The posting was published at some point (archived postings stay posted).
    pub const fn is_posted(self) -> bool {
        matches!(self, Self::Active | Self::Archived)
    }

    /// Display metadata for a status, owned here so every surface renders the
    /// same label, color token, and icon.
    pub const fn badge(self) -> StatusBadge {
        match self {
            Self::Draft => StatusBadge {
                label: "Draft",
                color_token: "neutral",
                icon: "pencil",
            },
            Self::Active => StatusBadge {
                label: "Active",
                color_token: "success",
                icon: "megaphone",
            },
            Self::Rejected => StatusBadge {
                label: "Rejected",
                color_token: "danger",
                icon: "x-circle",
            },
            Self::Archived => StatusBadge {
                label: "Archived",
                color_token: "muted",
                icon: "archive-box",
            },
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status display metadata consumed by every UI surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub label: &'static str,
    pub color_token: &'static str,
    pub icon: &'static str,
}

/// The central persisted entity.
///
/// Content fields (`title`, `description`, `compensation`) are opaque payload;
/// the engine never interprets them. Targeting fields are flattened into the
/// document shape (`target_schools`, `target_batches`, `target_centers`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: PostingId,
    pub recruiter_id: ActorId,
    pub company_id: Option<String>,

    pub title: String,
    pub description: Option<String>,
    pub compensation: Option<String>,

    pub status: JobStatus,
    pub is_active: bool,
    pub is_posted: bool,

    #[serde(flatten)]
    pub targeting: TargetSelection,

    pub drive_date: Option<DateTime<Utc>>,
    pub application_deadline: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<ActorId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<ActorId>,
    pub rejection_reason: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_by: Option<ActorId>,
    pub posted_at: Option<DateTime<Utc>>,
    pub posted_by: Option<ActorId>,
}

impl JobPosting {
    /// Build a fresh draft owned by `recruiter_id`.
    pub fn draft(id: PostingId, recruiter_id: ActorId, payload: NewPosting, now: DateTime<Utc>) -> Self {
        Self {
            id,
            recruiter_id,
            company_id: payload.company_id,
            title: payload.title,
            description: payload.description,
            compensation: payload.compensation,
            status: JobStatus::Draft,
            is_active: false,
            is_posted: false,
            targeting: TargetSelection::default(),
            drive_date: payload.drive_date,
            application_deadline: payload.application_deadline,
            created_at: now,
            updated_at: now,
            approved_at: None,
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
            rejection_reason: None,
            archived_at: None,
            archived_by: None,
            posted_at: None,
            posted_by: None,
        }
    }

    /// Rewrite the derived liveness flags from `status`.
    ///
    /// Migrated records sometimes carry flags that disagree with their status;
    /// the status wins and the flags are reconciled whenever a record passes
    /// through the store or the engine.
    pub fn reconcile_flags(&mut self) {
        self.is_active = self.status.is_active();
        self.is_posted = self.status.is_posted();
    }

    pub fn flags_consistent(&self) -> bool {
        self.is_active == self.status.is_active() && self.is_posted == self.status.is_posted()
    }
}

/// Recruiter-supplied payload for a new draft. Everything here is opaque
/// content except the scheduling instants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPosting {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub compensation: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub drive_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub application_deadline: Option<DateTime<Utc>>,
}

/// Event handed to the notification dispatcher after an effective transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub job_id: PostingId,
    pub previous_status: JobStatus,
    pub new_status: JobStatus,
    pub actor: ActorId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Referenced recruiter record, resolved for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruiterProfile {
    pub id: ActorId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Referenced company record, resolved for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
}
