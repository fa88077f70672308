use crate::error::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    ArtifactId, ArtifactKind, File, Job, JobKind, JobStatus, PointsTransaction, PurchaseGrant,
    ShareGrant, UserId, UserSubscription, VersionSnapshot,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// The ledger anchor. Every mutator
/// takes the *expected current value* of the field(s) it changes and the
/// implementation must apply the update only if the stored value still
/// matches — equivalent to a single conditional UPDATE, never a separate
/// read then write.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create(&self, sub: UserSubscription) -> StorageResult<()>;
    async fn get(&self, user_id: UserId) -> StorageResult<Option<UserSubscription>>;

    /// Atomically set `points_remaining` to `new_value` iff the stored
    /// value is currently `expected`. Returns `CasConflict` otherwise.
    async fn cas_points_remaining(
        &self,
        user_id: UserId,
        expected: i64,
        new_value: i64,
        points_total_delta: i64,
        points_used_delta: i64,
    ) -> StorageResult<()>;

    async fn cas_earnings_points(
        &self,
        user_id: UserId,
        expected: i64,
        new_value: i64,
    ) -> StorageResult<()>;

    /// Atomically resets the daily chat counter iff it is still at
    /// `expected_reset_at`.
    async fn cas_daily_chat_reset(
        &self,
        user_id: UserId,
        expected_reset_at: DateTime<Utc>,
        new_reset_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    async fn increment_daily_chat_count(&self, user_id: UserId) -> StorageResult<()>;

    async fn set_payment_info(&self, user_id: UserId, set: bool) -> StorageResult<()>;
}

/// Append-only ledger of points transactions.
#[async_trait]
pub trait LedgerTxStore: Send + Sync {
    async fn append(&self, tx: PointsTransaction) -> StorageResult<()>;
    async fn get(&self, tx_id: Uuid) -> StorageResult<Option<PointsTransaction>>;
    async fn list_for_user(
        &self,
        user_id: UserId,
        window: QueryWindow,
    ) -> StorageResult<Vec<PointsTransaction>>;
    /// Find by `(related_ref, kind)` — used for idempotency checks on
    /// commit/refund keyed by reservation id.
    async fn find_by_related_ref(
        &self,
        related_ref_id: Uuid,
        kind: core_types::TransactionKind,
    ) -> StorageResult<Option<PointsTransaction>>;
}

/// Durable job record.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: Job) -> StorageResult<()>;
    async fn get(&self, job_id: Uuid) -> StorageResult<Option<Job>>;

    /// Transition `status: expected_from -> to`, CAS-protected.
    async fn cas_status(
        &self,
        job_id: Uuid,
        expected_from: JobStatus,
        to: JobStatus,
    ) -> StorageResult<bool>;

    async fn update_progress(
        &self,
        job_id: Uuid,
        progress: u8,
        message: Option<String>,
    ) -> StorageResult<()>;

    async fn heartbeat(&self, job_id: Uuid) -> StorageResult<()>;

    async fn finalize(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> StorageResult<()>;

    async fn mark_reservation_resolved(&self, job_id: Uuid) -> StorageResult<()>;
    async fn mark_refund_pending(&self, job_id: Uuid, pending: bool) -> StorageResult<()>;
    async fn increment_attempts(&self, job_id: Uuid) -> StorageResult<u32>;

    /// `pending` jobs older than `older_than`, for the orphan reaper.
    async fn list_orphaned_pending(&self, older_than: DateTime<Utc>) -> StorageResult<Vec<Job>>;
    /// `processing` jobs whose heartbeat predates `stale_before`, for the
    /// watchdog.
    async fn list_stale_processing(&self, stale_before: DateTime<Utc>) -> StorageResult<Vec<Job>>;
    async fn list_refund_pending(&self) -> StorageResult<Vec<Job>>;
    async fn list_for_user(&self, user_id: UserId, kind: Option<JobKind>) -> StorageResult<Vec<Job>>;
}

/// A stored artifact: header fields live in `core_types::ArtifactHeader`
/// (serialized into `header_json`); kind-specific content lives in
/// `content_json` (the discriminator is `ArtifactKind`). This mirrors the
/// teacher's `ProjectionStore` (namespace + key + JSON payload) rather
/// than one SQL table per artifact kind, since content shape differs
/// per kind but the lifecycle operations (create/patch/version/restore)
/// do not.
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub artifact_id: ArtifactId,
    pub kind: ArtifactKind,
    pub header: serde_json::Value,
    pub content: serde_json::Value,
    pub versions: Vec<VersionSnapshot>,
}

#[async_trait]
pub trait ArtifactRecordStore: Send + Sync {
    async fn create(&self, record: ArtifactRecord) -> StorageResult<()>;
    async fn get(&self, artifact_id: ArtifactId) -> StorageResult<Option<ArtifactRecord>>;
    async fn find_by_slug(&self, slug: &str) -> StorageResult<Option<ArtifactRecord>>;

    /// Replace `content` and bump `version`, CAS-protected on the prior
    /// version — last writer wins at the field level.
    async fn cas_update_content(
        &self,
        artifact_id: ArtifactId,
        expected_version: u32,
        new_content: serde_json::Value,
        new_header: serde_json::Value,
        snapshot: VersionSnapshot,
    ) -> StorageResult<()>;

    async fn list_by_owner(&self, owner_id: UserId) -> StorageResult<Vec<ArtifactRecord>>;
    async fn list_marketplace(&self, kind: ArtifactKind) -> StorageResult<Vec<ArtifactRecord>>;
}

#[async_trait]
pub trait ShareStore: Send + Sync {
    async fn create(&self, share: ShareGrant) -> StorageResult<()>;
    async fn get(&self, share_id: Uuid) -> StorageResult<Option<ShareGrant>>;
    async fn find_active(
        &self,
        artifact_id: ArtifactId,
        sharee_email: &str,
    ) -> StorageResult<Option<ShareGrant>>;
    async fn update_status(
        &self,
        share_id: Uuid,
        status: core_types::ShareStatus,
    ) -> StorageResult<()>;
    async fn update_deadline(
        &self,
        share_id: Uuid,
        deadline: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;
    async fn list_for_sharee(&self, sharee_id: UserId) -> StorageResult<Vec<ShareGrant>>;
    async fn list_accepted_past_deadline(&self, now: DateTime<Utc>) -> StorageResult<Vec<ShareGrant>>;
}

#[async_trait]
pub trait PurchaseStore: Send + Sync {
    async fn create(&self, grant: PurchaseGrant) -> StorageResult<()>;
    async fn find_active(
        &self,
        artifact_id: ArtifactId,
        buyer_id: UserId,
        access_type: core_types::AccessType,
    ) -> StorageResult<Option<PurchaseGrant>>;
    async fn get(&self, grant_id: Uuid) -> StorageResult<Option<PurchaseGrant>>;
    /// CAS-protected `view_count` increment.
    async fn cas_increment_view(&self, grant_id: Uuid, expected_view_count: u32) -> StorageResult<()>;
    async fn list_for_buyer(&self, buyer_id: UserId) -> StorageResult<Vec<PurchaseGrant>>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn create(&self, file: File) -> StorageResult<()>;
    async fn get(&self, file_id: Uuid) -> StorageResult<Option<File>>;
    async fn list_for_user(&self, user_id: UserId, folder_id: Option<Uuid>) -> StorageResult<Vec<File>>;
    async fn delete(&self, file_id: Uuid) -> StorageResult<()>;
}

/// Unified bundle, mirroring `maple_storage::MapleStorage`.
pub trait CoreStorage:
    SubscriptionStore
    + LedgerTxStore
    + JobStore
    + ArtifactRecordStore
    + ShareStore
    + PurchaseStore
    + FileStore
    + Send
    + Sync
{
}

impl<T> CoreStorage for T where
    T: SubscriptionStore
        + LedgerTxStore
        + JobStore
        + ArtifactRecordStore
        + ShareStore
        + PurchaseStore
        + FileStore
        + Send
        + Sync
{
}
