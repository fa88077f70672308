//! Sharing & Marketplace Service: auto-accept share grants, the
//! purchase flow (debit buyer, credit owner, insert grant),
//! and earnings withdrawal. Grounded on the same facade-over-storage
//! shape as `ledger::Ledger`, composing it rather than re-deriving its
//! CAS discipline.

pub mod error;

use chrono::{DateTime, Utc};
use core_types::{AccessType, PurchaseGrant, ShareGrant, ShareStatus, UserId};
use error::{MarketplaceError, MarketplaceResult};
use ledger::Ledger;
use std::sync::Arc;
use storage::{PurchaseStore, ShareStore};
use tracing::{info, instrument};
use uuid::Uuid;

/// Revenue split ratio: owner receives 80%, platform keeps the rest.
/// This ratio is a system-wide constant, not configurable per listing.
const OWNER_SHARE_NUM: i64 = 80;
const OWNER_SHARE_DEN: i64 = 100;

pub trait MarketplaceStorage: ShareStore + PurchaseStore + Send + Sync {}
impl<T> MarketplaceStorage for T where T: ShareStore + PurchaseStore + Send + Sync {}

// `get`/`create`/`find_active` are defined on both `ShareStore` and
// `PurchaseStore`, so calling them on a `dyn MarketplaceStorage` receiver
// is ambiguous without these UFCS wrappers.
async fn purchase_get(
    storage: &dyn MarketplaceStorage,
    grant_id: Uuid,
) -> storage::StorageResult<Option<PurchaseGrant>> {
    PurchaseStore::get(storage, grant_id).await
}

async fn share_get(storage: &dyn MarketplaceStorage, share_id: Uuid) -> storage::StorageResult<Option<ShareGrant>> {
    ShareStore::get(storage, share_id).await
}

pub struct MarketplaceService {
    storage: Arc<dyn MarketplaceStorage>,
    ledger: Arc<Ledger>,
}

impl MarketplaceService {
    pub fn new(storage: Arc<dyn MarketplaceStorage>, ledger: Arc<Ledger>) -> Self {
        Self { storage, ledger }
    }

    // ---- Sharing ----

    /// `POST /share`: creates the grant already `accepted` — there is no
    /// pending state to accept into. Sharing always auto-accepts.
    #[instrument(skip(self))]
    pub async fn create_share(
        &self,
        artifact_id: core_types::ArtifactId,
        owner_id: UserId,
        sharee_email: String,
        sharee_id: Option<UserId>,
        deadline: Option<DateTime<Utc>>,
        message: Option<String>,
    ) -> MarketplaceResult<ShareGrant> {
        let now = Utc::now();
        let grant = ShareGrant {
            share_id: Uuid::new_v4(),
            artifact_id,
            owner_id,
            sharee_email,
            sharee_id,
            status: ShareStatus::Accepted,
            deadline,
            message,
            accepted_at: now,
            created_at: now,
        };
        ShareStore::create(self.storage.as_ref(), grant.clone()).await?;
        info!(share_id = %grant.share_id, %artifact_id, "share created (auto-accepted)");
        Ok(grant)
    }

    /// The sharee declines (or deletes) their own grant.
    #[instrument(skip(self))]
    pub async fn decline_share(&self, share_id: Uuid, caller_id: UserId) -> MarketplaceResult<()> {
        let share = share_get(self.storage.as_ref(), share_id)
            .await?
            .ok_or(MarketplaceError::ShareNotFound(share_id))?;
        if share.sharee_id != Some(caller_id) {
            return Err(MarketplaceError::NotSharee);
        }
        self.transition_share(share, ShareStatus::Declined).await
    }

    /// The owner revokes a share they granted — same terminal effect as
    /// a decline, but gated on ownership instead.
    #[instrument(skip(self))]
    pub async fn revoke_share(&self, share_id: Uuid, owner_id: UserId) -> MarketplaceResult<()> {
        let share = share_get(self.storage.as_ref(), share_id)
            .await?
            .ok_or(MarketplaceError::ShareNotFound(share_id))?;
        if share.owner_id != owner_id {
            return Err(MarketplaceError::NotOwner);
        }
        self.transition_share(share, ShareStatus::Declined).await
    }

    async fn transition_share(&self, share: ShareGrant, to: ShareStatus) -> MarketplaceResult<()> {
        if !share.status.can_transition_to(to) {
            return Ok(()); // already terminal; revoking twice is a no-op
        }
        ShareStore::update_status(self.storage.as_ref(), share.share_id, to).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_share_deadline(
        &self,
        share_id: Uuid,
        owner_id: UserId,
        deadline: Option<DateTime<Utc>>,
    ) -> MarketplaceResult<()> {
        let share = share_get(self.storage.as_ref(), share_id)
            .await?
            .ok_or(MarketplaceError::ShareNotFound(share_id))?;
        if share.owner_id != owner_id {
            return Err(MarketplaceError::NotOwner);
        }
        ShareStore::update_deadline(self.storage.as_ref(), share_id, deadline).await?;
        Ok(())
    }

    // ---- Purchase flow ----

    #[instrument(skip(self))]
    pub async fn purchase(
        &self,
        artifact_id: core_types::ArtifactId,
        buyer_id: UserId,
        owner_id: UserId,
        access_type: AccessType,
        price_points: i64,
    ) -> MarketplaceResult<PurchaseGrant> {
        if let Some(_existing) =
            PurchaseStore::find_active(self.storage.as_ref(), artifact_id, buyer_id, access_type).await?
        {
            return Err(MarketplaceError::AlreadyPurchased { user_id: buyer_id, artifact_id, access_type });
        }

        let purchase_id = Uuid::new_v4();
        let debit_result = self.ledger.debit_for_purchase(buyer_id, price_points, purchase_id).await;
        let _debit_tx = match debit_result {
            Ok(tx) => tx,
            Err(e) => return Err(MarketplaceError::Ledger(e)),
        };

        // From here on, any failure must refund the buyer before
        // returning.
        match self.finish_purchase(artifact_id, buyer_id, owner_id, access_type, price_points, purchase_id).await {
            Ok(grant) => Ok(grant),
            Err(e) => {
                let _ = self.ledger.refund_purchase(buyer_id, purchase_id, "purchase_failed").await;
                Err(e)
            }
        }
    }

    async fn finish_purchase(
        &self,
        artifact_id: core_types::ArtifactId,
        buyer_id: UserId,
        owner_id: UserId,
        access_type: AccessType,
        price_points: i64,
        purchase_id: Uuid,
    ) -> MarketplaceResult<PurchaseGrant> {
        let owner_reward = price_points * OWNER_SHARE_NUM / OWNER_SHARE_DEN;
        let platform_fee = price_points - owner_reward;

        self.ledger.revenue_credit(owner_id, owner_reward, purchase_id).await?;

        let grant = PurchaseGrant {
            grant_id: purchase_id,
            artifact_id,
            buyer_id,
            access_type,
            points_paid: price_points,
            owner_reward,
            platform_fee,
            view_count: 0,
            max_views: match access_type {
                AccessType::OneTime => Some(1),
                AccessType::Forever | AccessType::Download => None,
            },
            is_active: true,
            purchased_at: Utc::now(),
        };
        if !grant.split_is_consistent() {
            return Err(MarketplaceError::InvalidSplit);
        }
        PurchaseStore::create(self.storage.as_ref(), grant.clone()).await?;
        info!(grant_id = %grant.grant_id, %artifact_id, %buyer_id, "purchase grant created");
        Ok(grant)
    }

    pub async fn get_purchase(&self, grant_id: Uuid) -> MarketplaceResult<PurchaseGrant> {
        purchase_get(self.storage.as_ref(), grant_id)
            .await?
            .ok_or(MarketplaceError::PurchaseNotFound(grant_id))
    }

    // ---- Earnings withdrawal ----

    /// Requires `payment_info_set`; atomically debits `earnings_points`.
    /// There is no separate withdrawal-status row in this build — the
    /// ledger transaction itself is the durable record of the request
    /// (see DESIGN.md).
    #[instrument(skip(self))]
    pub async fn request_withdrawal(&self, user_id: UserId, amount: i64) -> MarketplaceResult<Uuid> {
        let balance = self.ledger.balance(user_id).await?;
        if !balance.payment_info_set {
            return Err(MarketplaceError::PaymentInfoMissing);
        }
        let withdrawal_id = Uuid::new_v4();
        self.ledger.withdraw(user_id, amount, withdrawal_id).await?;
        Ok(withdrawal_id)
    }

    /// Admin rejects a withdrawal: re-credit `earnings_points`.
    #[instrument(skip(self))]
    pub async fn reject_withdrawal(&self, user_id: UserId, withdrawal_id: Uuid) -> MarketplaceResult<()> {
        self.ledger
            .reject_withdrawal(user_id, withdrawal_id, "withdrawal_rejected")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::InMemoryStorage;

    fn service() -> (MarketplaceService, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        let ledger = Arc::new(Ledger::new(storage.clone()));
        (MarketplaceService::new(storage.clone(), ledger), storage)
    }

    #[tokio::test]
    async fn purchase_splits_revenue_80_20_and_debits_buyer() {
        let (service, storage) = service();
        let buyer_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        service.ledger.register(buyer_id, 100).await.unwrap();
        service.ledger.register(owner_id, 0).await.unwrap();

        let grant = service
            .purchase(Uuid::new_v4(), buyer_id, owner_id, AccessType::OneTime, 50)
            .await
            .unwrap();
        assert_eq!(grant.owner_reward, 40);
        assert_eq!(grant.platform_fee, 10);
        assert_eq!(grant.max_views, Some(1));

        assert_eq!(service.ledger.balance(buyer_id).await.unwrap().points_remaining, 50);
        assert_eq!(service.ledger.balance(owner_id).await.unwrap().earnings_points, 40);

        let _ = storage; // keep the handle alive for clarity in this test
    }

    #[tokio::test]
    async fn purchase_rejects_duplicate_active_grant() {
        let (service, _storage) = service();
        let buyer_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        let artifact_id = Uuid::new_v4();
        service.ledger.register(buyer_id, 100).await.unwrap();
        service.ledger.register(owner_id, 0).await.unwrap();

        service.purchase(artifact_id, buyer_id, owner_id, AccessType::Forever, 30).await.unwrap();
        let second = service.purchase(artifact_id, buyer_id, owner_id, AccessType::Forever, 30).await;
        assert!(matches!(second, Err(MarketplaceError::AlreadyPurchased { .. })));
    }

    #[tokio::test]
    async fn decline_share_requires_being_the_sharee() {
        let (service, _storage) = service();
        let owner_id = Uuid::new_v4();
        let sharee_id = Uuid::new_v4();
        let share = service
            .create_share(Uuid::new_v4(), owner_id, "sharee@example.com".to_string(), Some(sharee_id), None, None)
            .await
            .unwrap();

        let wrong_caller = service.decline_share(share.share_id, Uuid::new_v4()).await;
        assert!(matches!(wrong_caller, Err(MarketplaceError::NotSharee)));

        service.decline_share(share.share_id, sharee_id).await.unwrap();
    }

    #[tokio::test]
    async fn withdrawal_requires_payment_info() {
        let (service, _storage) = service();
        let user_id = Uuid::new_v4();
        service.ledger.register(user_id, 0).await.unwrap();

        let result = service.request_withdrawal(user_id, 10).await;
        assert!(matches!(result, Err(MarketplaceError::PaymentInfoMissing)));
    }
}
