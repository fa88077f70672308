use crate::{ArtifactId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// No `pending` variant: shares are auto-accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareStatus {
    Accepted,
    Completed,
    Expired,
    Declined,
}

impl ShareStatus {
    /// Transitions only move forward to a terminal state; there is no
    /// path back to `accepted`.
    pub fn can_transition_to(self, to: ShareStatus) -> bool {
        matches!(
            (self, to),
            (ShareStatus::Accepted, ShareStatus::Completed)
                | (ShareStatus::Accepted, ShareStatus::Expired)
                | (ShareStatus::Accepted, ShareStatus::Declined)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareGrant {
    pub share_id: Uuid,
    pub artifact_id: ArtifactId,
    pub owner_id: UserId,
    pub sharee_email: String,
    pub sharee_id: Option<UserId>,
    pub status: ShareStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub accepted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
