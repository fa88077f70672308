use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription tier. Quotas and pricing are derived from this in
/// `core-config`, not stored redundantly here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Premium,
    Pro,
    Vip,
}

/// One per user — the ledger anchor.
///
/// Mutated only by `ledger::Ledger`. Every balance field is read via a
/// CAS-protected update; never read-modify-write this struct directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSubscription {
    pub user_id: UserId,
    pub plan: Plan,
    pub points_remaining: i64,
    pub points_total: i64,
    pub points_used: i64,
    pub earnings_points: i64,
    pub daily_chat_count: u32,
    pub daily_chat_reset_at: DateTime<Utc>,
    pub storage_used_mb: u64,
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_info_set: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSubscription {
    /// A freshly registered subscription: `plan=free`, welcome balance
    /// credited, counters zeroed.
    pub fn new_welcome(user_id: UserId, welcome_points: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            plan: Plan::Free,
            points_remaining: welcome_points,
            points_total: welcome_points,
            points_used: 0,
            earnings_points: 0,
            daily_chat_count: 0,
            daily_chat_reset_at: now,
            storage_used_mb: 0,
            expires_at: None,
            payment_info_set: false,
            created_at: now,
            updated_at: now,
        }
    }
}
