//! Access Engine: resolves `can_access(user, artifact, intent)` across
//! ownership, sharing, and purchase grants. First match wins — see
//! [`AccessEngine::can_access`].
//!
//! The expiration sweep loop is grounded on the teacher's
//! `scheduler::Scheduler` reconciliation loop shape (a spawned task on an
//! interval, toggled by a shared running flag) rather than anything
//! access-specific in the teacher, since the teacher has no paywall
//! concept of its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_errors::AccessDenialReason;
use core_types::{AccessType, ArtifactId, PurchaseGrant, ShareGrant, ShareStatus, UserId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storage::{PurchaseStore, ShareStore, StorageResult};
use tokio::time::{interval, Duration as TokioDuration};
use tracing::instrument;
use uuid::Uuid;

/// `ShareStore::get` and `PurchaseStore::get` collide by name; every call
/// through `dyn AccessStorage` goes through the wrappers below.
pub trait AccessStorage: ShareStore + PurchaseStore + Send + Sync {}
impl<T> AccessStorage for T where T: ShareStore + PurchaseStore + Send + Sync {}

async fn purchase_get(
    storage: &dyn AccessStorage,
    grant_id: Uuid,
) -> StorageResult<Option<PurchaseGrant>> {
    PurchaseStore::get(storage, grant_id).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    View,
    Edit,
    TakeTest,
    Download,
}

/// What the caller already knows about the artifact being accessed —
/// built by the orchestrator from the artifact header/content it already
/// loaded, so this crate never deserializes artifact JSON itself.
#[derive(Debug, Clone)]
pub struct ArtifactAccessContext {
    pub artifact_id: ArtifactId,
    pub owner_id: UserId,
    pub visibility: core_types::Visibility,
    /// True when the marketplace listing has no price attached to
    /// `intent == View`.
    pub is_free_to_view: bool,
    /// Test-level global deadline, used for share-deadline inheritance
    /// when the share itself carries none.
    pub global_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub enum AccessGrantKind {
    Owner,
    Share,
    Purchase,
    FreeMarketplace,
}

#[derive(Debug, Clone)]
pub struct AccessGranted {
    pub kind: AccessGrantKind,
    /// Set only when this grant came from a `one_time` purchase whose
    /// view was just consumed — the caller must serve content before (or
    /// exactly at) calling [`AccessEngine::consume_one_time_view`].
    pub purchase_grant_id: Option<Uuid>,
}

pub type AccessResult = Result<AccessGranted, AccessDenialReason>;

pub struct AccessEngine {
    storage: Arc<dyn AccessStorage>,
}

impl AccessEngine {
    pub fn new(storage: Arc<dyn AccessStorage>) -> Self {
        Self { storage }
    }

    /// First-match-wins resolution.
    #[instrument(skip(self, ctx))]
    pub async fn can_access(
        &self,
        user_id: Option<UserId>,
        ctx: &ArtifactAccessContext,
        intent: Intent,
    ) -> AccessResult {
        // 1. free marketplace view, anonymous allowed.
        if ctx.visibility == core_types::Visibility::Marketplace
            && ctx.is_free_to_view
            && intent == Intent::View
        {
            return Ok(AccessGranted {
                kind: AccessGrantKind::FreeMarketplace,
                purchase_grant_id: None,
            });
        }

        let user_id = match user_id {
            Some(id) => id,
            None => return Err(AccessDenialReason::NoShare),
        };

        // 2. owner, all intents.
        if user_id == ctx.owner_id {
            return Ok(AccessGranted {
                kind: AccessGrantKind::Owner,
                purchase_grant_id: None,
            });
        }

        // 3. accepted share, deadline not passed.
        if matches!(intent, Intent::View | Intent::TakeTest) {
            if let Some(share) = self.find_active_share(ctx.artifact_id, user_id).await? {
                let deadline = share.deadline.or(ctx.global_deadline);
                match deadline {
                    Some(d) if Utc::now() > d => return Err(AccessDenialReason::DeadlinePassed),
                    _ => {
                        return Ok(AccessGranted {
                            kind: AccessGrantKind::Share,
                            purchase_grant_id: None,
                        })
                    }
                }
            }
        }

        // 4. active purchase grant.
        let access_type = match intent {
            Intent::Download => AccessType::Download,
            _ => AccessType::Forever,
        };
        if let Some(grant) = PurchaseStore::find_active(
            self.storage.as_ref(),
            ctx.artifact_id,
            user_id,
            access_type,
        )
        .await
        .map_err(|_| AccessDenialReason::NeedsPurchase)?
        {
            if grant.views_remaining() {
                return Ok(AccessGranted {
                    kind: AccessGrantKind::Purchase,
                    purchase_grant_id: Some(grant.grant_id),
                });
            }
            return Err(AccessDenialReason::Expired);
        }
        if let Some(grant) = PurchaseStore::find_active(
            self.storage.as_ref(),
            ctx.artifact_id,
            user_id,
            AccessType::OneTime,
        )
        .await
        .map_err(|_| AccessDenialReason::NeedsPurchase)?
        {
            if grant.views_remaining() {
                return Ok(AccessGranted {
                    kind: AccessGrantKind::Purchase,
                    purchase_grant_id: Some(grant.grant_id),
                });
            }
            return Err(AccessDenialReason::Expired);
        }

        // 5. deny.
        Err(AccessDenialReason::NeedsPurchase)
    }

    async fn find_active_share(
        &self,
        artifact_id: ArtifactId,
        sharee_id: UserId,
    ) -> Result<Option<ShareGrant>, AccessDenialReason> {
        let shares = self
            .storage
            .list_for_sharee(sharee_id)
            .await
            .map_err(|_| AccessDenialReason::NoShare)?;
        Ok(shares
            .into_iter()
            .find(|s| s.artifact_id == artifact_id && s.status == ShareStatus::Accepted))
    }

    /// §4.3.1: CAS-protected one-time view increment on first byte of
    /// content served. A failed downstream render does not refund the
    /// view — an accepted atomicity trade-off, not a bug.
    #[instrument(skip(self))]
    pub async fn consume_one_time_view(&self, grant_id: Uuid) -> Result<(), AccessDenialReason> {
        let grant = purchase_get(self.storage.as_ref(), grant_id)
            .await
            .map_err(|_| AccessDenialReason::NeedsPurchase)?
            .ok_or(AccessDenialReason::NeedsPurchase)?;
        if !grant.views_remaining() {
            return Err(AccessDenialReason::Expired);
        }
        self.storage
            .cas_increment_view(grant_id, grant.view_count)
            .await
            .map_err(|_| AccessDenialReason::Expired)
    }

    /// Marks `accepted` shares whose deadline has passed as `expired`.
    /// The read path in
    /// [`Self::can_access`] also checks the deadline defensively, so
    /// correctness never depends on this sweep's timing.
    #[instrument(skip(self))]
    pub async fn sweep_expired_shares(&self, now: DateTime<Utc>) -> StorageResult<u32> {
        let expired = self.storage.list_accepted_past_deadline(now).await?;
        let mut count = 0;
        for share in expired {
            self.storage
                .update_status(share.share_id, ShareStatus::Expired)
                .await?;
            count += 1;
        }
        Ok(count)
    }

    /// Spawns the periodic sweep task. Returns a handle whose `Drop` (via
    /// the returned `AbortHandle`) or explicit `stop()` call ends it.
    pub fn spawn_expiration_sweep(self: Arc<Self>, period: TokioDuration) -> SweepHandle {
        let running = Arc::new(AtomicBool::new(true));
        let running_task = running.clone();
        let engine = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            while running_task.load(Ordering::Relaxed) {
                ticker.tick().await;
                match engine.sweep_expired_shares(Utc::now()).await {
                    Ok(n) if n > 0 => tracing::info!(expired = n, "swept expired shares"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "expiration sweep failed"),
                }
            }
        });
        SweepHandle { running, task }
    }
}

pub struct SweepHandle {
    running: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl SweepHandle {
    pub fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_types::Visibility;
    use storage::InMemoryStorage;

    fn ctx(owner: UserId, artifact_id: ArtifactId, free: bool) -> ArtifactAccessContext {
        ArtifactAccessContext {
            artifact_id,
            owner_id: owner,
            visibility: Visibility::Marketplace,
            is_free_to_view: free,
            global_deadline: None,
        }
    }

    fn engine() -> (AccessEngine, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::default());
        (AccessEngine::new(storage.clone()), storage)
    }

    #[tokio::test]
    async fn owner_can_always_access() {
        let (engine, _storage) = engine();
        let owner = Uuid::new_v4();
        let artifact_id = Uuid::new_v4();
        let c = ctx(owner, artifact_id, false);
        let granted = engine.can_access(Some(owner), &c, Intent::Edit).await.unwrap();
        assert!(matches!(granted.kind, AccessGrantKind::Owner));
    }

    #[tokio::test]
    async fn anonymous_view_allowed_only_when_free_marketplace() {
        let (engine, _storage) = engine();
        let owner = Uuid::new_v4();
        let artifact_id = Uuid::new_v4();
        let free = ctx(owner, artifact_id, true);
        assert!(engine.can_access(None, &free, Intent::View).await.is_ok());

        let paid = ctx(owner, artifact_id, false);
        assert!(engine.can_access(None, &paid, Intent::View).await.is_err());
    }

    #[tokio::test]
    async fn stranger_without_share_or_purchase_is_denied_needs_purchase() {
        let (engine, _storage) = engine();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let artifact_id = Uuid::new_v4();
        let c = ctx(owner, artifact_id, false);
        let err = engine
            .can_access(Some(stranger), &c, Intent::View)
            .await
            .unwrap_err();
        assert_eq!(err, AccessDenialReason::NeedsPurchase);
    }

    #[tokio::test]
    async fn one_time_purchase_allows_single_view_then_denies() {
        let (engine, storage) = engine();
        let owner = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let artifact_id = Uuid::new_v4();
        let grant = PurchaseGrant {
            grant_id: Uuid::new_v4(),
            artifact_id,
            buyer_id: buyer,
            access_type: AccessType::OneTime,
            points_paid: 50,
            owner_reward: 40,
            platform_fee: 10,
            view_count: 0,
            max_views: Some(1),
            is_active: true,
            purchased_at: Utc::now(),
        };
        PurchaseStore::create(storage.as_ref(), grant.clone()).await.unwrap();

        let c = ctx(owner, artifact_id, false);
        let granted = engine.can_access(Some(buyer), &c, Intent::View).await.unwrap();
        let grant_id = granted.purchase_grant_id.unwrap();
        engine.consume_one_time_view(grant_id).await.unwrap();

        let err = engine
            .can_access(Some(buyer), &c, Intent::View)
            .await
            .unwrap_err();
        assert_eq!(err, AccessDenialReason::NeedsPurchase);
    }

    #[tokio::test]
    async fn share_past_deadline_is_denied() {
        let (engine, storage) = engine();
        let owner = Uuid::new_v4();
        let sharee = Uuid::new_v4();
        let artifact_id = Uuid::new_v4();
        let share = ShareGrant {
            share_id: Uuid::new_v4(),
            artifact_id,
            owner_id: owner,
            sharee_email: "a@example.com".to_string(),
            sharee_id: Some(sharee),
            status: ShareStatus::Accepted,
            deadline: Some(Utc::now() - Duration::days(1)),
            message: None,
            accepted_at: Utc::now(),
            created_at: Utc::now(),
        };
        ShareStore::create(storage.as_ref(), share).await.unwrap();

        let c = ctx(owner, artifact_id, false);
        let err = engine
            .can_access(Some(sharee), &c, Intent::View)
            .await
            .unwrap_err();
        assert_eq!(err, AccessDenialReason::DeadlinePassed);
    }
}
