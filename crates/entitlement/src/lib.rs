//! Entitlement Resolver: given (user, action), decides whether the plan,
//! daily counters, and storage/file quotas allow it. Grounded on the
//! teacher's `AccountabilityLedger` facade shape (one struct wrapping
//! storage + a narrow set of read/decide methods), but this crate never
//! mutates a balance itself — it either asks `ledger::Ledger` to apply a
//! counter reset or tells the caller "allow" / "deny, here's why".
//!
//! The data model has no per-user timezone field, so `user_tz_or_utc`
//! resolves to UTC everywhere in this build (see DESIGN.md).

use chrono::{DateTime, Duration, TimeZone, Utc};
use core_config::{quota_for_plan, PlanQuota};
use core_types::{Plan, UserId, UserSubscription};
use ledger::Ledger;
use storage::{FileStore, StorageResult, SubscriptionStore};
use tracing::instrument;

/// Trait-collision note: `SubscriptionStore::get` and `FileStore::get`
/// share a name, so calls through `dyn EntitlementStorage` must go
/// through the UFCS wrappers below rather than `storage.get(..)`.
pub trait EntitlementStorage: SubscriptionStore + FileStore + Send + Sync {}
impl<T> EntitlementStorage for T where T: SubscriptionStore + FileStore + Send + Sync {}

async fn sub_get(
    storage: &dyn EntitlementStorage,
    user_id: UserId,
) -> StorageResult<Option<UserSubscription>> {
    SubscriptionStore::get(storage, user_id).await
}

/// The chat action a user is attempting to take, distinguished only by
/// whether it uses the platform default LLM (free-tier metered) or an
/// explicitly chosen other model (always paid, regardless of plan).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatModelChoice {
    DefaultLlm,
    OtherLlm,
}

/// A non-chat action gated purely by storage/file-count quota.
#[derive(Debug, Clone, Copy)]
pub struct StorageDelta {
    pub additional_files: u32,
    pub additional_mb: u64,
}

#[derive(Debug, Clone)]
pub struct EntitlementDenial {
    pub reason: String,
    pub upgrade_hint: Option<String>,
}

impl From<EntitlementDenial> for core_errors::CoreError {
    fn from(value: EntitlementDenial) -> Self {
        core_errors::CoreError::Entitlement {
            reason: value.reason,
            upgrade_hint: value.upgrade_hint,
        }
    }
}

pub type EntitlementResult = Result<(), EntitlementDenial>;

fn upgrade_hint_for(plan: Plan) -> Option<String> {
    match plan {
        Plan::Free => Some("upgrade to Premium for a higher daily chat allowance".to_string()),
        Plan::Premium => Some("upgrade to Pro for a higher daily chat allowance".to_string()),
        Plan::Pro => Some("upgrade to Vip for unlimited default-model chats".to_string()),
        Plan::Vip => None,
    }
}

/// The next daily-counter reset instant. With no stored per-user
/// timezone, the reset is always computed in UTC in this build.
pub fn start_of_next_day(now: DateTime<Utc>) -> DateTime<Utc> {
    let next_date = now.date_naive().succ_opt().expect("date overflow");
    Utc.from_utc_datetime(&next_date.and_hms_opt(0, 0, 0).expect("valid midnight"))
}

pub struct EntitlementResolver {
    storage: std::sync::Arc<dyn EntitlementStorage>,
    ledger: std::sync::Arc<Ledger>,
}

impl EntitlementResolver {
    pub fn new(
        storage: std::sync::Arc<dyn EntitlementStorage>,
        ledger: std::sync::Arc<Ledger>,
    ) -> Self {
        Self { storage, ledger }
    }

    /// Lazily resets the daily chat counter if it is due, then returns the
    /// (possibly refreshed) subscription. Owns the "is it due" check and
    /// the `start_of_next_day` computation — the ledger only applies the
    /// CAS once told the new value.
    #[instrument(skip(self))]
    async fn refreshed_subscription(&self, user_id: UserId) -> Result<UserSubscription, EntitlementDenial> {
        let sub = sub_get(self.storage.as_ref(), user_id)
            .await
            .map_err(|e| backend_denial(e))?
            .ok_or_else(|| EntitlementDenial {
                reason: format!("no subscription for user {user_id}"),
                upgrade_hint: None,
            })?;

        let now = Utc::now();
        if now < sub.daily_chat_reset_at {
            return Ok(sub);
        }

        let new_reset_at = start_of_next_day(now);
        self.ledger
            .reset_daily_chat_count(user_id, sub.daily_chat_reset_at, new_reset_at)
            .await
            .map_err(|e| EntitlementDenial {
                reason: format!("failed to reset daily chat counter: {e}"),
                upgrade_hint: None,
            })?;

        sub_get(self.storage.as_ref(), user_id)
            .await
            .map_err(backend_denial)?
            .ok_or_else(|| EntitlementDenial {
                reason: format!("no subscription for user {user_id}"),
                upgrade_hint: None,
            })
    }

    /// Free-tier default-LLM chat quota. Resets the daily
    /// counter lazily if due, then checks `daily_chat_count` against the
    /// plan's allowance. Other-LLM chats are never free-tier metered —
    /// they're paid, so they flow through `ledger::reserve` instead and
    /// always pass this check.
    #[instrument(skip(self))]
    pub async fn check_chat(
        &self,
        user_id: UserId,
        choice: ChatModelChoice,
    ) -> EntitlementResult {
        if choice == ChatModelChoice::OtherLlm {
            return Ok(());
        }
        let sub = self.refreshed_subscription(user_id).await?;
        let quota = quota_for_plan(sub.plan);
        if sub.daily_chat_count >= quota.free_daily_default_llm_chats {
            return Err(EntitlementDenial {
                reason: "daily free chat allowance exhausted".to_string(),
                upgrade_hint: upgrade_hint_for(sub.plan),
            });
        }
        Ok(())
    }

    /// Call only after `check_chat` allowed the action and it actually
    /// executed — never increment before the action has actually run.
    pub async fn record_chat(&self, user_id: UserId, choice: ChatModelChoice) -> EntitlementResult {
        if choice == ChatModelChoice::OtherLlm {
            return Ok(());
        }
        self.ledger
            .increment_daily_chat_count(user_id)
            .await
            .map_err(|e| EntitlementDenial {
                reason: format!("failed to record chat usage: {e}"),
                upgrade_hint: None,
            })
    }

    /// Storage/file-count quota check. Counts the user's
    /// current files directly — there is no separate aggregate counter
    /// to keep in sync, so this is exact but O(file count) per call.
    #[instrument(skip(self))]
    pub async fn check_storage_quota(&self, user_id: UserId, delta: StorageDelta) -> EntitlementResult {
        let sub = sub_get(self.storage.as_ref(), user_id)
            .await
            .map_err(backend_denial)?
            .ok_or_else(|| EntitlementDenial {
                reason: format!("no subscription for user {user_id}"),
                upgrade_hint: None,
            })?;
        let quota = quota_for_plan(sub.plan);

        let files = self
            .storage
            .list_for_user(user_id, None)
            .await
            .map_err(backend_denial)?;
        let file_count = files.len() as u32 + delta.additional_files;
        if file_count > quota.max_files {
            return Err(EntitlementDenial {
                reason: "file count quota exceeded".to_string(),
                upgrade_hint: upgrade_hint_for(sub.plan),
            });
        }

        let used_mb: u64 = files.iter().map(|f| f.size_bytes / (1024 * 1024)).sum();
        if used_mb + delta.additional_mb > quota.max_storage_mb {
            return Err(EntitlementDenial {
                reason: "storage quota exceeded".to_string(),
                upgrade_hint: upgrade_hint_for(sub.plan),
            });
        }
        Ok(())
    }

    pub fn quota_for(&self, plan: Plan) -> PlanQuota {
        quota_for_plan(plan)
    }
}

fn backend_denial(e: storage::StorageError) -> EntitlementDenial {
    EntitlementDenial {
        reason: format!("storage error: {e}"),
        upgrade_hint: None,
    }
}

/// Exposed for `entitlement` itself and for tests elsewhere that need a
/// rolling "is this reset due" check without constructing a resolver.
pub fn reset_is_due(now: DateTime<Utc>, daily_chat_reset_at: DateTime<Utc>) -> bool {
    now >= daily_chat_reset_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use std::sync::Arc;
    use storage::InMemoryStorage;

    fn resolver() -> (EntitlementResolver, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::default());
        let ledger = Arc::new(Ledger::new(storage.clone()));
        (
            EntitlementResolver::new(storage.clone(), ledger),
            storage,
        )
    }

    #[test]
    fn start_of_next_day_is_midnight_of_following_date() {
        let now = Utc.with_ymd_and_hms(2026, 7, 30, 14, 32, 10).unwrap();
        let next = start_of_next_day(now);
        assert_eq!(next.date_naive(), now.date_naive().succ_opt().unwrap());
        assert_eq!((next.hour(), next.minute(), next.second()), (0, 0, 0));
    }

    #[test]
    fn reset_is_due_is_inclusive_of_boundary() {
        let t = Utc.with_ymd_and_hms(2026, 7, 30, 0, 0, 0).unwrap();
        assert!(reset_is_due(t, t));
        assert!(!reset_is_due(t - Duration::seconds(1), t));
    }

    #[tokio::test]
    async fn other_llm_chat_is_never_metered() {
        let (resolver, storage) = resolver();
        let user_id = uuid::Uuid::new_v4();
        SubscriptionStore::create(
            storage.as_ref(),
            UserSubscription::new_welcome(user_id, 50, Utc::now()),
        )
        .await
        .unwrap();
        for _ in 0..1000 {
            resolver
                .check_chat(user_id, ChatModelChoice::OtherLlm)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn default_llm_chat_exhausts_free_daily_allowance() {
        let (resolver, storage) = resolver();
        let user_id = uuid::Uuid::new_v4();
        SubscriptionStore::create(
            storage.as_ref(),
            UserSubscription::new_welcome(user_id, 50, Utc::now()),
        )
        .await
        .unwrap();
        let quota = resolver.quota_for(Plan::Free);
        for _ in 0..quota.free_daily_default_llm_chats {
            resolver
                .check_chat(user_id, ChatModelChoice::DefaultLlm)
                .await
                .unwrap();
            resolver
                .record_chat(user_id, ChatModelChoice::DefaultLlm)
                .await
                .unwrap();
        }
        let denial = resolver
            .check_chat(user_id, ChatModelChoice::DefaultLlm)
            .await
            .unwrap_err();
        assert!(denial.upgrade_hint.is_some());
    }

    #[tokio::test]
    async fn storage_quota_counts_existing_files_plus_delta() {
        let (resolver, storage) = resolver();
        let user_id = uuid::Uuid::new_v4();
        SubscriptionStore::create(
            storage.as_ref(),
            UserSubscription::new_welcome(user_id, 50, Utc::now()),
        )
        .await
        .unwrap();
        let quota = resolver.quota_for(Plan::Free);
        let result = resolver
            .check_storage_quota(
                user_id,
                StorageDelta {
                    additional_files: quota.max_files + 1,
                    additional_mb: 0,
                },
            )
            .await;
        assert!(result.is_err());
    }
}
