use crate::{ArtifactId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    OneTime,
    Forever,
    Download,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseGrant {
    pub grant_id: Uuid,
    pub artifact_id: ArtifactId,
    pub buyer_id: UserId,
    pub access_type: AccessType,
    pub points_paid: i64,
    pub owner_reward: i64,
    pub platform_fee: i64,
    pub view_count: u32,
    /// `1` for `one_time`, `None` (unbounded) for `forever`/`download`.
    pub max_views: Option<u32>,
    pub is_active: bool,
    pub purchased_at: DateTime<Utc>,
}

impl PurchaseGrant {
    /// Invariant: `owner_reward + platform_fee == points_paid`.
    pub fn split_is_consistent(&self) -> bool {
        self.owner_reward + self.platform_fee == self.points_paid
    }

    pub fn views_remaining(&self) -> bool {
        match self.max_views {
            Some(max) => self.view_count < max,
            None => true,
        }
    }
}
