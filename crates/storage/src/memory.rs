//! In-memory reference implementation of [`crate::traits::CoreStorage`].
//! Deterministic and test-friendly, mirroring
//! `maple_storage::memory::InMemoryMapleStorage`. Production deployments
//! use [`crate::postgres::PostgresStorage`] instead.

use crate::error::{StorageError, StorageResult};
use crate::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::*;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStorage {
    subscriptions: RwLock<HashMap<UserId, UserSubscription>>,
    transactions: RwLock<Vec<PointsTransaction>>,
    jobs: RwLock<HashMap<Uuid, Job>>,
    artifacts: RwLock<HashMap<ArtifactId, ArtifactRecord>>,
    shares: RwLock<HashMap<Uuid, ShareGrant>>,
    purchases: RwLock<HashMap<Uuid, PurchaseGrant>>,
    files: RwLock<HashMap<Uuid, File>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err(what: &str) -> StorageError {
        StorageError::Backend(format!("{what} lock poisoned"))
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStorage {
    async fn create(&self, sub: UserSubscription) -> StorageResult<()> {
        let mut guard = self
            .subscriptions
            .write()
            .map_err(|_| Self::lock_err("subscriptions"))?;
        if guard.contains_key(&sub.user_id) {
            return Err(StorageError::InvariantViolation(format!(
                "subscription for {} already exists",
                sub.user_id
            )));
        }
        guard.insert(sub.user_id, sub);
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> StorageResult<Option<UserSubscription>> {
        let guard = self
            .subscriptions
            .read()
            .map_err(|_| Self::lock_err("subscriptions"))?;
        Ok(guard.get(&user_id).cloned())
    }

    async fn cas_points_remaining(
        &self,
        user_id: UserId,
        expected: i64,
        new_value: i64,
        points_total_delta: i64,
        points_used_delta: i64,
    ) -> StorageResult<()> {
        let mut guard = self
            .subscriptions
            .write()
            .map_err(|_| Self::lock_err("subscriptions"))?;
        let sub = guard
            .get_mut(&user_id)
            .ok_or_else(|| StorageError::NotFound(format!("subscription {user_id}")))?;
        if sub.points_remaining != expected {
            return Err(StorageError::CasConflict(format!(
                "points_remaining expected {expected}, found {}",
                sub.points_remaining
            )));
        }
        sub.points_remaining = new_value;
        sub.points_total += points_total_delta;
        sub.points_used += points_used_delta;
        sub.updated_at = Utc::now();
        Ok(())
    }

    async fn cas_earnings_points(
        &self,
        user_id: UserId,
        expected: i64,
        new_value: i64,
    ) -> StorageResult<()> {
        let mut guard = self
            .subscriptions
            .write()
            .map_err(|_| Self::lock_err("subscriptions"))?;
        let sub = guard
            .get_mut(&user_id)
            .ok_or_else(|| StorageError::NotFound(format!("subscription {user_id}")))?;
        if sub.earnings_points != expected {
            return Err(StorageError::CasConflict(format!(
                "earnings_points expected {expected}, found {}",
                sub.earnings_points
            )));
        }
        sub.earnings_points = new_value;
        sub.updated_at = Utc::now();
        Ok(())
    }

    async fn cas_daily_chat_reset(
        &self,
        user_id: UserId,
        expected_reset_at: DateTime<Utc>,
        new_reset_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut guard = self
            .subscriptions
            .write()
            .map_err(|_| Self::lock_err("subscriptions"))?;
        let sub = guard
            .get_mut(&user_id)
            .ok_or_else(|| StorageError::NotFound(format!("subscription {user_id}")))?;
        if sub.daily_chat_reset_at != expected_reset_at {
            return Err(StorageError::CasConflict(
                "daily_chat_reset_at changed concurrently".to_string(),
            ));
        }
        sub.daily_chat_count = 0;
        sub.daily_chat_reset_at = new_reset_at;
        Ok(())
    }

    async fn increment_daily_chat_count(&self, user_id: UserId) -> StorageResult<()> {
        let mut guard = self
            .subscriptions
            .write()
            .map_err(|_| Self::lock_err("subscriptions"))?;
        let sub = guard
            .get_mut(&user_id)
            .ok_or_else(|| StorageError::NotFound(format!("subscription {user_id}")))?;
        sub.daily_chat_count += 1;
        Ok(())
    }

    async fn set_payment_info(&self, user_id: UserId, set: bool) -> StorageResult<()> {
        let mut guard = self
            .subscriptions
            .write()
            .map_err(|_| Self::lock_err("subscriptions"))?;
        let sub = guard
            .get_mut(&user_id)
            .ok_or_else(|| StorageError::NotFound(format!("subscription {user_id}")))?;
        sub.payment_info_set = set;
        Ok(())
    }
}

#[async_trait]
impl LedgerTxStore for InMemoryStorage {
    async fn append(&self, tx: PointsTransaction) -> StorageResult<()> {
        let mut guard = self
            .transactions
            .write()
            .map_err(|_| Self::lock_err("transactions"))?;
        guard.push(tx);
        Ok(())
    }

    async fn get(&self, tx_id: Uuid) -> StorageResult<Option<PointsTransaction>> {
        let guard = self
            .transactions
            .read()
            .map_err(|_| Self::lock_err("transactions"))?;
        Ok(guard.iter().find(|t| t.tx_id == tx_id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        window: QueryWindow,
    ) -> StorageResult<Vec<PointsTransaction>> {
        let guard = self
            .transactions
            .read()
            .map_err(|_| Self::lock_err("transactions"))?;
        let mut items: Vec<_> = guard
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by_key(|t| t.created_at);
        let limit = if window.limit == 0 { items.len() } else { window.limit };
        Ok(items.into_iter().skip(window.offset).take(limit).collect())
    }

    async fn find_by_related_ref(
        &self,
        related_ref_id: Uuid,
        kind: TransactionKind,
    ) -> StorageResult<Option<PointsTransaction>> {
        let guard = self
            .transactions
            .read()
            .map_err(|_| Self::lock_err("transactions"))?;
        Ok(guard
            .iter()
            .find(|t| t.kind == kind && related_ref_id_matches(t, related_ref_id))
            .cloned())
    }
}

fn related_ref_id_matches(tx: &PointsTransaction, id: Uuid) -> bool {
    match &tx.related_ref {
        Some(core_types::points::RelatedRef::Job(j)) => *j == id,
        Some(core_types::points::RelatedRef::Purchase(p)) => *p == id,
        Some(core_types::points::RelatedRef::Transfer(t)) => *t == id,
        Some(core_types::points::RelatedRef::Withdrawal(w)) => *w == id,
        None => false,
    }
}

#[async_trait]
impl JobStore for InMemoryStorage {
    async fn create(&self, job: Job) -> StorageResult<()> {
        let mut guard = self.jobs.write().map_err(|_| Self::lock_err("jobs"))?;
        guard.insert(job.job_id, job);
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> StorageResult<Option<Job>> {
        let guard = self.jobs.read().map_err(|_| Self::lock_err("jobs"))?;
        Ok(guard.get(&job_id).cloned())
    }

    async fn cas_status(
        &self,
        job_id: Uuid,
        expected_from: JobStatus,
        to: JobStatus,
    ) -> StorageResult<bool> {
        let mut guard = self.jobs.write().map_err(|_| Self::lock_err("jobs"))?;
        let job = guard
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        if job.status != expected_from || !expected_from.can_transition_to(to) {
            return Ok(false);
        }
        job.status = to;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        progress: u8,
        message: Option<String>,
    ) -> StorageResult<()> {
        let mut guard = self.jobs.write().map_err(|_| Self::lock_err("jobs"))?;
        let job = guard
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        // Progress is monotone non-decreasing.
        job.progress = job.progress.max(progress.min(100));
        if message.is_some() {
            job.message = message;
        }
        job.heartbeat_at = Utc::now();
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn heartbeat(&self, job_id: Uuid) -> StorageResult<()> {
        let mut guard = self.jobs.write().map_err(|_| Self::lock_err("jobs"))?;
        let job = guard
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        job.heartbeat_at = Utc::now();
        Ok(())
    }

    async fn finalize(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> StorageResult<()> {
        let mut guard = self.jobs.write().map_err(|_| Self::lock_err("jobs"))?;
        let job = guard
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        if !job.status.can_transition_to(status) {
            return Err(StorageError::InvariantViolation(format!(
                "cannot finalize job {job_id} from {:?} to {:?}",
                job.status, status
            )));
        }
        job.status = status;
        if status == JobStatus::Completed {
            job.progress = 100;
        }
        job.result = result;
        job.error = error;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_reservation_resolved(&self, job_id: Uuid) -> StorageResult<()> {
        let mut guard = self.jobs.write().map_err(|_| Self::lock_err("jobs"))?;
        let job = guard
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        job.reservation_resolved = true;
        Ok(())
    }

    async fn mark_refund_pending(&self, job_id: Uuid, pending: bool) -> StorageResult<()> {
        let mut guard = self.jobs.write().map_err(|_| Self::lock_err("jobs"))?;
        let job = guard
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        job.refund_pending = pending;
        Ok(())
    }

    async fn increment_attempts(&self, job_id: Uuid) -> StorageResult<u32> {
        let mut guard = self.jobs.write().map_err(|_| Self::lock_err("jobs"))?;
        let job = guard
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        job.attempts += 1;
        Ok(job.attempts)
    }

    async fn list_orphaned_pending(&self, older_than: DateTime<Utc>) -> StorageResult<Vec<Job>> {
        let guard = self.jobs.read().map_err(|_| Self::lock_err("jobs"))?;
        Ok(guard
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.created_at < older_than)
            .cloned()
            .collect())
    }

    async fn list_stale_processing(&self, stale_before: DateTime<Utc>) -> StorageResult<Vec<Job>> {
        let guard = self.jobs.read().map_err(|_| Self::lock_err("jobs"))?;
        Ok(guard
            .values()
            .filter(|j| j.status == JobStatus::Processing && j.heartbeat_at < stale_before)
            .cloned()
            .collect())
    }

    async fn list_refund_pending(&self) -> StorageResult<Vec<Job>> {
        let guard = self.jobs.read().map_err(|_| Self::lock_err("jobs"))?;
        Ok(guard.values().filter(|j| j.refund_pending).cloned().collect())
    }

    async fn list_for_user(&self, user_id: UserId, kind: Option<JobKind>) -> StorageResult<Vec<Job>> {
        let guard = self.jobs.read().map_err(|_| Self::lock_err("jobs"))?;
        Ok(guard
            .values()
            .filter(|j| j.user_id == user_id && kind.map(|k| k == j.kind).unwrap_or(true))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ArtifactRecordStore for InMemoryStorage {
    async fn create(&self, record: ArtifactRecord) -> StorageResult<()> {
        let mut guard = self.artifacts.write().map_err(|_| Self::lock_err("artifacts"))?;
        guard.insert(record.artifact_id, record);
        Ok(())
    }

    async fn get(&self, artifact_id: ArtifactId) -> StorageResult<Option<ArtifactRecord>> {
        let guard = self.artifacts.read().map_err(|_| Self::lock_err("artifacts"))?;
        Ok(guard.get(&artifact_id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> StorageResult<Option<ArtifactRecord>> {
        let guard = self.artifacts.read().map_err(|_| Self::lock_err("artifacts"))?;
        Ok(guard
            .values()
            .find(|r| r.header.get("slug").and_then(|v| v.as_str()) == Some(slug))
            .cloned())
    }

    async fn cas_update_content(
        &self,
        artifact_id: ArtifactId,
        expected_version: u32,
        new_content: serde_json::Value,
        new_header: serde_json::Value,
        snapshot: VersionSnapshot,
    ) -> StorageResult<()> {
        let mut guard = self.artifacts.write().map_err(|_| Self::lock_err("artifacts"))?;
        let record = guard
            .get_mut(&artifact_id)
            .ok_or_else(|| StorageError::NotFound(format!("artifact {artifact_id}")))?;
        let current_version = record
            .header
            .get("version")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;
        if current_version != expected_version {
            return Err(StorageError::CasConflict(format!(
                "artifact {artifact_id} version expected {expected_version}, found {current_version}"
            )));
        }
        record.content = new_content;
        record.header = new_header;
        record.versions.push(snapshot);
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: UserId) -> StorageResult<Vec<ArtifactRecord>> {
        let guard = self.artifacts.read().map_err(|_| Self::lock_err("artifacts"))?;
        Ok(guard
            .values()
            .filter(|r| r.header.get("owner_user_id").and_then(|v| v.as_str()) == Some(&owner_id.to_string()))
            .cloned()
            .collect())
    }

    async fn list_marketplace(&self, kind: ArtifactKind) -> StorageResult<Vec<ArtifactRecord>> {
        let guard = self.artifacts.read().map_err(|_| Self::lock_err("artifacts"))?;
        Ok(guard
            .values()
            .filter(|r| {
                r.kind == kind
                    && r.header.get("visibility").and_then(|v| v.as_str()) == Some("marketplace")
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ShareStore for InMemoryStorage {
    async fn create(&self, share: ShareGrant) -> StorageResult<()> {
        let mut guard = self.shares.write().map_err(|_| Self::lock_err("shares"))?;
        let dup = guard.values().any(|s| {
            s.artifact_id == share.artifact_id
                && s.sharee_email == share.sharee_email
                && matches!(s.status, ShareStatus::Accepted)
        });
        if dup {
            return Err(StorageError::InvariantViolation(
                "active share already exists for (artifact_id, sharee_email)".to_string(),
            ));
        }
        guard.insert(share.share_id, share);
        Ok(())
    }

    async fn get(&self, share_id: Uuid) -> StorageResult<Option<ShareGrant>> {
        let guard = self.shares.read().map_err(|_| Self::lock_err("shares"))?;
        Ok(guard.get(&share_id).cloned())
    }

    async fn find_active(
        &self,
        artifact_id: ArtifactId,
        sharee_email: &str,
    ) -> StorageResult<Option<ShareGrant>> {
        let guard = self.shares.read().map_err(|_| Self::lock_err("shares"))?;
        Ok(guard
            .values()
            .find(|s| {
                s.artifact_id == artifact_id
                    && s.sharee_email == sharee_email
                    && matches!(s.status, ShareStatus::Accepted)
            })
            .cloned())
    }

    async fn update_status(&self, share_id: Uuid, status: ShareStatus) -> StorageResult<()> {
        let mut guard = self.shares.write().map_err(|_| Self::lock_err("shares"))?;
        let share = guard
            .get_mut(&share_id)
            .ok_or_else(|| StorageError::NotFound(format!("share {share_id}")))?;
        if !share.status.can_transition_to(status) {
            return Err(StorageError::InvariantViolation(format!(
                "invalid share transition {:?} -> {:?}",
                share.status, status
            )));
        }
        share.status = status;
        Ok(())
    }

    async fn update_deadline(&self, share_id: Uuid, deadline: Option<DateTime<Utc>>) -> StorageResult<()> {
        let mut guard = self.shares.write().map_err(|_| Self::lock_err("shares"))?;
        let share = guard
            .get_mut(&share_id)
            .ok_or_else(|| StorageError::NotFound(format!("share {share_id}")))?;
        share.deadline = deadline;
        Ok(())
    }

    async fn list_for_sharee(&self, sharee_id: UserId) -> StorageResult<Vec<ShareGrant>> {
        let guard = self.shares.read().map_err(|_| Self::lock_err("shares"))?;
        Ok(guard
            .values()
            .filter(|s| s.sharee_id == Some(sharee_id))
            .cloned()
            .collect())
    }

    async fn list_accepted_past_deadline(&self, now: DateTime<Utc>) -> StorageResult<Vec<ShareGrant>> {
        let guard = self.shares.read().map_err(|_| Self::lock_err("shares"))?;
        Ok(guard
            .values()
            .filter(|s| {
                matches!(s.status, ShareStatus::Accepted) && s.deadline.map(|d| d <= now).unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PurchaseStore for InMemoryStorage {
    async fn create(&self, grant: PurchaseGrant) -> StorageResult<()> {
        let mut guard = self.purchases.write().map_err(|_| Self::lock_err("purchases"))?;
        guard.insert(grant.grant_id, grant);
        Ok(())
    }

    async fn find_active(
        &self,
        artifact_id: ArtifactId,
        buyer_id: UserId,
        access_type: AccessType,
    ) -> StorageResult<Option<PurchaseGrant>> {
        let guard = self.purchases.read().map_err(|_| Self::lock_err("purchases"))?;
        Ok(guard
            .values()
            .find(|g| {
                g.artifact_id == artifact_id
                    && g.buyer_id == buyer_id
                    && g.access_type == access_type
                    && g.is_active
            })
            .cloned())
    }

    async fn get(&self, grant_id: Uuid) -> StorageResult<Option<PurchaseGrant>> {
        let guard = self.purchases.read().map_err(|_| Self::lock_err("purchases"))?;
        Ok(guard.get(&grant_id).cloned())
    }

    async fn cas_increment_view(&self, grant_id: Uuid, expected_view_count: u32) -> StorageResult<()> {
        let mut guard = self.purchases.write().map_err(|_| Self::lock_err("purchases"))?;
        let grant = guard
            .get_mut(&grant_id)
            .ok_or_else(|| StorageError::NotFound(format!("purchase grant {grant_id}")))?;
        if grant.view_count != expected_view_count {
            return Err(StorageError::CasConflict(format!(
                "view_count expected {expected_view_count}, found {}",
                grant.view_count
            )));
        }
        if !grant.views_remaining() {
            return Err(StorageError::InvariantViolation("max_views exceeded".to_string()));
        }
        grant.view_count += 1;
        Ok(())
    }

    async fn list_for_buyer(&self, buyer_id: UserId) -> StorageResult<Vec<PurchaseGrant>> {
        let guard = self.purchases.read().map_err(|_| Self::lock_err("purchases"))?;
        Ok(guard.values().filter(|g| g.buyer_id == buyer_id).cloned().collect())
    }
}

#[async_trait]
impl FileStore for InMemoryStorage {
    async fn create(&self, file: File) -> StorageResult<()> {
        let mut guard = self.files.write().map_err(|_| Self::lock_err("files"))?;
        guard.insert(file.file_id, file);
        Ok(())
    }

    async fn get(&self, file_id: Uuid) -> StorageResult<Option<File>> {
        let guard = self.files.read().map_err(|_| Self::lock_err("files"))?;
        Ok(guard.get(&file_id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId, folder_id: Option<Uuid>) -> StorageResult<Vec<File>> {
        let guard = self.files.read().map_err(|_| Self::lock_err("files"))?;
        Ok(guard
            .values()
            .filter(|f| f.user_id == user_id && (folder_id.is_none() || f.folder_id == folder_id))
            .cloned()
            .collect())
    }

    async fn delete(&self, file_id: Uuid) -> StorageResult<()> {
        let mut guard = self.files.write().map_err(|_| Self::lock_err("files"))?;
        guard
            .remove(&file_id)
            .ok_or_else(|| StorageError::NotFound(format!("file {file_id}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn welcome_sub(user_id: UserId) -> UserSubscription {
        UserSubscription::new_welcome(user_id, 50, Utc::now())
    }

    #[tokio::test]
    async fn cas_points_remaining_rejects_stale_expected() {
        let store = InMemoryStorage::new();
        let user_id = Uuid::new_v4();
        store.create(welcome_sub(user_id)).await.unwrap();

        store
            .cas_points_remaining(user_id, 50, 45, 0, 5)
            .await
            .unwrap();

        let conflict = store.cas_points_remaining(user_id, 50, 40, 0, 5).await;
        assert!(matches!(conflict, Err(StorageError::CasConflict(_))));

        let sub = SubscriptionStore::get(&store, user_id).await.unwrap().unwrap();
        assert_eq!(sub.points_remaining, 45);
    }

    #[tokio::test]
    async fn job_status_transitions_are_monotone() {
        let store = InMemoryStorage::new();
        let job = Job {
            job_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: JobKind::SlideGenerate,
            status: JobStatus::Pending,
            progress: 0,
            message: None,
            payload: serde_json::json!({}),
            result: None,
            error: None,
            points_reserved: 5,
            reservation_resolved: false,
            refund_pending: false,
            attempts: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            heartbeat_at: Utc::now(),
        };
        let job_id = job.job_id;
        store.create(job).await.unwrap();

        let advanced = store
            .cas_status(job_id, JobStatus::Pending, JobStatus::Processing)
            .await
            .unwrap();
        assert!(advanced);

        // Pending -> Completed is not a legal direct transition.
        let rejected = store
            .cas_status(job_id, JobStatus::Pending, JobStatus::Completed)
            .await
            .unwrap();
        assert!(!rejected);
    }

    #[tokio::test]
    async fn purchase_view_cap_is_enforced() {
        let store = InMemoryStorage::new();
        let grant = PurchaseGrant {
            grant_id: Uuid::new_v4(),
            artifact_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            access_type: AccessType::OneTime,
            points_paid: 10,
            owner_reward: 8,
            platform_fee: 2,
            view_count: 0,
            max_views: Some(1),
            is_active: true,
            purchased_at: Utc::now(),
        };
        let grant_id = grant.grant_id;
        store.create(grant).await.unwrap();

        store.cas_increment_view(grant_id, 0).await.unwrap();
        let over_cap = store.cas_increment_view(grant_id, 1).await;
        assert!(over_cap.is_err());
    }
}
