//! Points & Entitlement Ledger: the CAS-based accounting core. Every
//! balance mutation goes through exactly one of [`Ledger::reserve`],
//! [`Ledger::commit`], [`Ledger::refund`],
//! [`Ledger::revenue_credit`], or [`Ledger::withdraw`] — never a direct
//! storage write. Mirrors the teacher's `AccountabilityLedger` facade:
//! a thin typed API wrapping an `Arc<dyn Storage>`, with `From` glue
//! turning storage errors into this crate's own error enum.

pub mod error;
pub mod retry;

use chrono::Utc;
use core_types::points::RelatedRef;
use core_types::{JobStatus, PointsTransaction, TransactionKind, UserId, UserSubscription};
use error::{LedgerError, LedgerResult};
use retry::{with_cas_retry, RetryPolicy};
use std::sync::Arc;
use storage::{JobStore, LedgerTxStore, SubscriptionStore};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Bundle of the storage traits the ledger touches. Blanket-implemented,
/// same shape as `storage::CoreStorage`.
pub trait LedgerStorage: SubscriptionStore + LedgerTxStore + JobStore + Send + Sync {}
impl<T> LedgerStorage for T where T: SubscriptionStore + LedgerTxStore + JobStore + Send + Sync {}

// `get`/`create` are defined on more than one of the traits `LedgerStorage`
// bundles (subscriptions, jobs, transactions), so calling them on a `dyn
// LedgerStorage` receiver is ambiguous without these one-line UFCS wrappers.
async fn sub_get(storage: &dyn LedgerStorage, user_id: UserId) -> storage::StorageResult<Option<UserSubscription>> {
    SubscriptionStore::get(storage, user_id).await
}

async fn sub_create(storage: &dyn LedgerStorage, sub: UserSubscription) -> storage::StorageResult<()> {
    SubscriptionStore::create(storage, sub).await
}

pub struct Ledger {
    storage: Arc<dyn LedgerStorage>,
    retry_policy: RetryPolicy,
}

impl Ledger {
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self { storage, retry_policy: RetryPolicy::default() }
    }

    pub fn with_retry_policy(storage: Arc<dyn LedgerStorage>, retry_policy: RetryPolicy) -> Self {
        Self { storage, retry_policy }
    }

    /// Register a brand-new subscription with the welcome balance.
    /// Not itself CAS-protected: the row does
    /// not exist yet, so there is nothing to race against except a
    /// duplicate registration, which the storage layer rejects.
    #[instrument(skip(self))]
    pub async fn register(&self, user_id: UserId, welcome_points: i64) -> LedgerResult<UserSubscription> {
        let sub = UserSubscription::new_welcome(user_id, welcome_points, Utc::now());
        sub_create(self.storage.as_ref(), sub.clone()).await?;
        Ok(sub)
    }

    /// Debit `amount` points against `user_id` for `job_id`, creating a
    /// pending reservation. Idempotent: a second call with the same
    /// `job_id` returns the transaction already on record instead of
    /// double-debiting on a retried enqueue.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        user_id: UserId,
        amount: i64,
        reason_code: &str,
        job_id: Uuid,
    ) -> LedgerResult<PointsTransaction> {
        if let Some(existing) = self
            .storage
            .find_by_related_ref(job_id, TransactionKind::Debit)
            .await?
        {
            return Ok(existing);
        }

        let tx = with_cas_retry(self.retry_policy, || {
            let storage = Arc::clone(&self.storage);
            let reason_code = reason_code.to_string();
            async move {
                let sub = sub_get(storage.as_ref(), user_id)
                    .await?
                    .ok_or(LedgerError::SubscriptionNotFound(user_id))?;
                if sub.points_remaining < amount {
                    return Err(LedgerError::InsufficientFunds {
                        needed: amount,
                        available: sub.points_remaining,
                    });
                }
                let new_remaining = sub.points_remaining - amount;
                match storage
                    .cas_points_remaining(user_id, sub.points_remaining, new_remaining, 0, amount)
                    .await
                {
                    Ok(()) => {
                        let tx = PointsTransaction {
                            tx_id: Uuid::new_v4(),
                            user_id,
                            delta: -amount,
                            balance_after: new_remaining,
                            kind: TransactionKind::Debit,
                            reason_code,
                            related_ref: Some(RelatedRef::Job(job_id)),
                            created_at: Utc::now(),
                        };
                        storage.append(tx.clone()).await?;
                        Ok(Some(tx))
                    }
                    Err(storage::StorageError::CasConflict(_)) => Ok(None),
                    Err(e) => Err(LedgerError::from(e)),
                }
            }
        })
        .await?;

        info!(%user_id, %job_id, amount, "points reserved");
        Ok(tx)
    }

    /// Mark a reservation's job as resolved without moving points back
    /// (the debit already happened in [`Self::reserve`]). Idempotent.
    #[instrument(skip(self))]
    pub async fn commit(&self, job_id: Uuid) -> LedgerResult<()> {
        self.storage.mark_reservation_resolved(job_id).await?;
        Ok(())
    }

    /// Reverse a reservation: credit the points back and mark the job
    /// resolved. Idempotent on `job_id` — a second call for an already
    /// refunded job returns the existing refund transaction.
    #[instrument(skip(self))]
    pub async fn refund(&self, user_id: UserId, job_id: Uuid, reason_code: &str) -> LedgerResult<PointsTransaction> {
        if let Some(existing) = self
            .storage
            .find_by_related_ref(job_id, TransactionKind::Refund)
            .await?
        {
            return Ok(existing);
        }

        let debit = self
            .storage
            .find_by_related_ref(job_id, TransactionKind::Debit)
            .await?
            .ok_or_else(|| LedgerError::InvariantViolation(format!(
                "refund requested for job {job_id} with no matching debit"
            )))?;
        let amount = -debit.delta;

        let tx = with_cas_retry(self.retry_policy, || {
            let storage = Arc::clone(&self.storage);
            let reason_code = reason_code.to_string();
            async move {
                let sub = sub_get(storage.as_ref(), user_id)
                    .await?
                    .ok_or(LedgerError::SubscriptionNotFound(user_id))?;
                let new_remaining = sub.points_remaining + amount;
                match storage
                    .cas_points_remaining(user_id, sub.points_remaining, new_remaining, 0, -amount)
                    .await
                {
                    Ok(()) => {
                        let tx = PointsTransaction {
                            tx_id: Uuid::new_v4(),
                            user_id,
                            delta: amount,
                            balance_after: new_remaining,
                            kind: TransactionKind::Refund,
                            reason_code,
                            related_ref: Some(RelatedRef::Job(job_id)),
                            created_at: Utc::now(),
                        };
                        storage.append(tx.clone()).await?;
                        Ok(Some(tx))
                    }
                    Err(storage::StorageError::CasConflict(_)) => Ok(None),
                    Err(e) => Err(LedgerError::from(e)),
                }
            }
        })
        .await?;

        self.storage.mark_reservation_resolved(job_id).await?;
        self.storage.mark_refund_pending(job_id, false).await?;
        warn!(%user_id, %job_id, amount, "points refunded");
        Ok(tx)
    }

    /// If a job finalized as `failed`/`cancelled` without its reservation
    /// ever being resolved, the worker/reaper should flag it
    /// `refund_pending` so a sweep can retry the refund later.
    #[instrument(skip(self))]
    pub async fn flag_refund_pending(&self, job_id: Uuid) -> LedgerResult<()> {
        self.storage.mark_refund_pending(job_id, true).await?;
        Ok(())
    }

    /// Debit `amount` points from `buyer_id` for a marketplace purchase,
    /// keyed by `purchase_id` rather than a job — there is no `Job` row
    /// to resolve a reservation against, so unlike [`Self::reserve`]
    /// this never touches `JobStore`. Idempotent on `purchase_id`.
    #[instrument(skip(self))]
    pub async fn debit_for_purchase(
        &self,
        buyer_id: UserId,
        amount: i64,
        purchase_id: Uuid,
    ) -> LedgerResult<PointsTransaction> {
        if let Some(existing) = self
            .storage
            .find_by_related_ref(purchase_id, TransactionKind::Debit)
            .await?
        {
            return Ok(existing);
        }

        with_cas_retry(self.retry_policy, || {
            let storage = Arc::clone(&self.storage);
            async move {
                let sub = sub_get(storage.as_ref(), buyer_id)
                    .await?
                    .ok_or(LedgerError::SubscriptionNotFound(buyer_id))?;
                if sub.points_remaining < amount {
                    return Err(LedgerError::InsufficientFunds {
                        needed: amount,
                        available: sub.points_remaining,
                    });
                }
                let new_remaining = sub.points_remaining - amount;
                match storage
                    .cas_points_remaining(buyer_id, sub.points_remaining, new_remaining, 0, amount)
                    .await
                {
                    Ok(()) => {
                        let tx = PointsTransaction {
                            tx_id: Uuid::new_v4(),
                            user_id: buyer_id,
                            delta: -amount,
                            balance_after: new_remaining,
                            kind: TransactionKind::Debit,
                            reason_code: "marketplace_purchase".to_string(),
                            related_ref: Some(RelatedRef::Purchase(purchase_id)),
                            created_at: Utc::now(),
                        };
                        storage.append(tx.clone()).await?;
                        Ok(Some(tx))
                    }
                    Err(storage::StorageError::CasConflict(_)) => Ok(None),
                    Err(e) => Err(LedgerError::from(e)),
                }
            }
        })
        .await
    }

    /// Reverses a purchase debit if a later step in the purchase flow
    /// fails after the debit has already landed. Idempotent on
    /// `purchase_id`.
    #[instrument(skip(self))]
    pub async fn refund_purchase(
        &self,
        buyer_id: UserId,
        purchase_id: Uuid,
        reason_code: &str,
    ) -> LedgerResult<PointsTransaction> {
        if let Some(existing) = self
            .storage
            .find_by_related_ref(purchase_id, TransactionKind::Refund)
            .await?
        {
            return Ok(existing);
        }

        let debit = self
            .storage
            .find_by_related_ref(purchase_id, TransactionKind::Debit)
            .await?
            .ok_or_else(|| LedgerError::InvariantViolation(format!(
                "refund requested for purchase {purchase_id} with no matching debit"
            )))?;
        let amount = -debit.delta;

        let tx = with_cas_retry(self.retry_policy, || {
            let storage = Arc::clone(&self.storage);
            let reason_code = reason_code.to_string();
            async move {
                let sub = sub_get(storage.as_ref(), buyer_id)
                    .await?
                    .ok_or(LedgerError::SubscriptionNotFound(buyer_id))?;
                let new_remaining = sub.points_remaining + amount;
                match storage
                    .cas_points_remaining(buyer_id, sub.points_remaining, new_remaining, 0, -amount)
                    .await
                {
                    Ok(()) => {
                        let tx = PointsTransaction {
                            tx_id: Uuid::new_v4(),
                            user_id: buyer_id,
                            delta: amount,
                            balance_after: new_remaining,
                            kind: TransactionKind::Refund,
                            reason_code,
                            related_ref: Some(RelatedRef::Purchase(purchase_id)),
                            created_at: Utc::now(),
                        };
                        storage.append(tx.clone()).await?;
                        Ok(Some(tx))
                    }
                    Err(storage::StorageError::CasConflict(_)) => Ok(None),
                    Err(e) => Err(LedgerError::from(e)),
                }
            }
        })
        .await?;

        warn!(%buyer_id, %purchase_id, amount, "purchase refunded");
        Ok(tx)
    }

    /// Credit a marketplace owner's share of a purchase into
    /// `earnings_points`. Idempotent on `purchase_id`.
    #[instrument(skip(self))]
    pub async fn revenue_credit(
        &self,
        owner_id: UserId,
        amount: i64,
        purchase_id: Uuid,
    ) -> LedgerResult<PointsTransaction> {
        if let Some(existing) = self
            .storage
            .find_by_related_ref(purchase_id, TransactionKind::RevenueCredit)
            .await?
        {
            return Ok(existing);
        }

        with_cas_retry(self.retry_policy, || {
            let storage = Arc::clone(&self.storage);
            async move {
                let sub = sub_get(storage.as_ref(), owner_id)
                    .await?
                    .ok_or(LedgerError::SubscriptionNotFound(owner_id))?;
                let new_earnings = sub.earnings_points + amount;
                match storage
                    .cas_earnings_points(owner_id, sub.earnings_points, new_earnings)
                    .await
                {
                    Ok(()) => {
                        let tx = PointsTransaction {
                            tx_id: Uuid::new_v4(),
                            user_id: owner_id,
                            delta: amount,
                            balance_after: new_earnings,
                            kind: TransactionKind::RevenueCredit,
                            reason_code: "marketplace_purchase".to_string(),
                            related_ref: Some(RelatedRef::Purchase(purchase_id)),
                            created_at: Utc::now(),
                        };
                        storage.append(tx.clone()).await?;
                        Ok(Some(tx))
                    }
                    Err(storage::StorageError::CasConflict(_)) => Ok(None),
                    Err(e) => Err(LedgerError::from(e)),
                }
            }
        })
        .await
    }

    /// Debit `amount` from `earnings_points` for a withdrawal request.
    /// Idempotent on `withdrawal_id`.
    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        user_id: UserId,
        amount: i64,
        withdrawal_id: Uuid,
    ) -> LedgerResult<PointsTransaction> {
        if let Some(existing) = self
            .storage
            .find_by_related_ref(withdrawal_id, TransactionKind::Withdrawal)
            .await?
        {
            return Ok(existing);
        }

        with_cas_retry(self.retry_policy, || {
            let storage = Arc::clone(&self.storage);
            async move {
                let sub = sub_get(storage.as_ref(), user_id)
                    .await?
                    .ok_or(LedgerError::SubscriptionNotFound(user_id))?;
                if sub.earnings_points < amount {
                    return Err(LedgerError::InsufficientFunds {
                        needed: amount,
                        available: sub.earnings_points,
                    });
                }
                let new_earnings = sub.earnings_points - amount;
                match storage
                    .cas_earnings_points(user_id, sub.earnings_points, new_earnings)
                    .await
                {
                    Ok(()) => {
                        let tx = PointsTransaction {
                            tx_id: Uuid::new_v4(),
                            user_id,
                            delta: -amount,
                            balance_after: new_earnings,
                            kind: TransactionKind::Withdrawal,
                            reason_code: "owner_withdrawal".to_string(),
                            related_ref: Some(RelatedRef::Withdrawal(withdrawal_id)),
                            created_at: Utc::now(),
                        };
                        storage.append(tx.clone()).await?;
                        Ok(Some(tx))
                    }
                    Err(storage::StorageError::CasConflict(_)) => Ok(None),
                    Err(e) => Err(LedgerError::from(e)),
                }
            }
        })
        .await
    }

    /// Reverses a withdrawal that an admin rejected, crediting
    /// `earnings_points` back with a `credit` transaction. There is no
    /// separate withdrawal-status row — the original `withdrawal` debit
    /// transaction is the durable record, and this credit transaction
    /// is its reversal; idempotent on `withdrawal_id`.
    #[instrument(skip(self))]
    pub async fn reject_withdrawal(
        &self,
        user_id: UserId,
        withdrawal_id: Uuid,
        reason_code: &str,
    ) -> LedgerResult<PointsTransaction> {
        if let Some(existing) = self
            .storage
            .find_by_related_ref(withdrawal_id, TransactionKind::Credit)
            .await?
        {
            return Ok(existing);
        }

        let debit = self
            .storage
            .find_by_related_ref(withdrawal_id, TransactionKind::Withdrawal)
            .await?
            .ok_or_else(|| LedgerError::InvariantViolation(format!(
                "reject requested for withdrawal {withdrawal_id} with no matching debit"
            )))?;
        let amount = -debit.delta;

        with_cas_retry(self.retry_policy, || {
            let storage = Arc::clone(&self.storage);
            let reason_code = reason_code.to_string();
            async move {
                let sub = sub_get(storage.as_ref(), user_id)
                    .await?
                    .ok_or(LedgerError::SubscriptionNotFound(user_id))?;
                let new_earnings = sub.earnings_points + amount;
                match storage
                    .cas_earnings_points(user_id, sub.earnings_points, new_earnings)
                    .await
                {
                    Ok(()) => {
                        let tx = PointsTransaction {
                            tx_id: Uuid::new_v4(),
                            user_id,
                            delta: amount,
                            balance_after: new_earnings,
                            kind: TransactionKind::Credit,
                            reason_code,
                            related_ref: Some(RelatedRef::Withdrawal(withdrawal_id)),
                            created_at: Utc::now(),
                        };
                        storage.append(tx.clone()).await?;
                        Ok(Some(tx))
                    }
                    Err(storage::StorageError::CasConflict(_)) => Ok(None),
                    Err(e) => Err(LedgerError::from(e)),
                }
            }
        })
        .await
    }

    /// CAS-reset the daily chat counter to `new_reset_at`, tolerating a
    /// conflict (someone else already reset it). The *when* and *to what
    /// value* are the entitlement crate's policy
    /// (`entitlement::next_daily_reset_at`); the ledger only applies it.
    #[instrument(skip(self))]
    pub async fn reset_daily_chat_count(
        &self,
        user_id: UserId,
        expected_reset_at: chrono::DateTime<Utc>,
        new_reset_at: chrono::DateTime<Utc>,
    ) -> LedgerResult<()> {
        match self
            .storage
            .cas_daily_chat_reset(user_id, expected_reset_at, new_reset_at)
            .await
        {
            Ok(()) | Err(storage::StorageError::CasConflict(_)) => Ok(()),
            Err(e) => Err(LedgerError::from(e)),
        }
    }

    pub async fn increment_daily_chat_count(&self, user_id: UserId) -> LedgerResult<()> {
        self.storage.increment_daily_chat_count(user_id).await?;
        Ok(())
    }

    pub async fn balance(&self, user_id: UserId) -> LedgerResult<UserSubscription> {
        sub_get(self.storage.as_ref(), user_id)
            .await?
            .ok_or(LedgerError::SubscriptionNotFound(user_id))
    }

    /// Refund sweep target: jobs that finalized without their
    /// reservation being resolved one way or the other.
    pub async fn list_jobs_needing_refund(&self) -> LedgerResult<Vec<core_types::Job>> {
        let pending = self.storage.list_refund_pending().await?;
        Ok(pending
            .into_iter()
            .filter(|j| j.status.is_terminal() && !j.reservation_resolved)
            .collect())
    }
}

/// Whether a job in a terminal failure state still owes its user a
/// refund.
pub fn job_owes_refund(job: &core_types::Job) -> bool {
    matches!(job.status, JobStatus::Failed | JobStatus::Cancelled) && !job.reservation_resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::InMemoryStorage;

    fn ledger() -> (Ledger, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        (Ledger::new(storage.clone()), storage)
    }

    #[tokio::test]
    async fn reserve_then_refund_restores_balance() {
        let (ledger, _storage) = ledger();
        let user_id = Uuid::new_v4();
        ledger.register(user_id, 50).await.unwrap();

        let job_id = Uuid::new_v4();
        ledger.reserve(user_id, 20, "slide_generate", job_id).await.unwrap();
        let after_reserve = ledger.balance(user_id).await.unwrap();
        assert_eq!(after_reserve.points_remaining, 30);

        ledger.refund(user_id, job_id, "job_failed").await.unwrap();
        let after_refund = ledger.balance(user_id).await.unwrap();
        assert_eq!(after_refund.points_remaining, 50);
    }

    #[tokio::test]
    async fn reserve_is_idempotent_on_job_id() {
        let (ledger, _storage) = ledger();
        let user_id = Uuid::new_v4();
        ledger.register(user_id, 50).await.unwrap();
        let job_id = Uuid::new_v4();

        let first = ledger.reserve(user_id, 10, "chat", job_id).await.unwrap();
        let second = ledger.reserve(user_id, 10, "chat", job_id).await.unwrap();
        assert_eq!(first.tx_id, second.tx_id);

        let balance = ledger.balance(user_id).await.unwrap();
        assert_eq!(balance.points_remaining, 40);
    }

    #[tokio::test]
    async fn reserve_rejects_when_balance_too_low() {
        let (ledger, _storage) = ledger();
        let user_id = Uuid::new_v4();
        ledger.register(user_id, 5).await.unwrap();
        let job_id = Uuid::new_v4();

        let result = ledger.reserve(user_id, 10, "slide_generate", job_id).await;
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
    }

    #[tokio::test]
    async fn debit_for_purchase_is_idempotent_and_refundable() {
        let (ledger, _storage) = ledger();
        let buyer_id = Uuid::new_v4();
        ledger.register(buyer_id, 100).await.unwrap();
        let purchase_id = Uuid::new_v4();

        let first = ledger.debit_for_purchase(buyer_id, 50, purchase_id).await.unwrap();
        let second = ledger.debit_for_purchase(buyer_id, 50, purchase_id).await.unwrap();
        assert_eq!(first.tx_id, second.tx_id);
        assert_eq!(ledger.balance(buyer_id).await.unwrap().points_remaining, 50);

        ledger.refund_purchase(buyer_id, purchase_id, "purchase_failed").await.unwrap();
        assert_eq!(ledger.balance(buyer_id).await.unwrap().points_remaining, 100);
    }

    #[tokio::test]
    async fn revenue_credit_then_withdraw_round_trips() {
        let (ledger, _storage) = ledger();
        let owner_id = Uuid::new_v4();
        ledger.register(owner_id, 0).await.unwrap();

        let purchase_id = Uuid::new_v4();
        ledger.revenue_credit(owner_id, 40, purchase_id).await.unwrap();
        let balance = ledger.balance(owner_id).await.unwrap();
        assert_eq!(balance.earnings_points, 40);

        let withdrawal_id = Uuid::new_v4();
        ledger.withdraw(owner_id, 40, withdrawal_id).await.unwrap();
        let balance = ledger.balance(owner_id).await.unwrap();
        assert_eq!(balance.earnings_points, 0);

        // Re-withdrawing with the same id must not double-debit.
        let again = ledger.withdraw(owner_id, 40, withdrawal_id).await.unwrap();
        assert_eq!(again.balance_after, 0);
    }

    proptest::proptest! {
        #[test]
        fn reserve_never_drives_balance_negative(start in 0i64..1000, debits in proptest::collection::vec(0i64..200, 0..20)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async move {
                let (ledger, _storage) = ledger();
                let user_id = Uuid::new_v4();
                ledger.register(user_id, start).await.unwrap();
                for amount in debits {
                    let job_id = Uuid::new_v4();
                    let _ = ledger.reserve(user_id, amount, "prop", job_id).await;
                }
                let balance = ledger.balance(user_id).await.unwrap();
                assert!(balance.points_remaining >= 0);
            });
        }
    }
}
