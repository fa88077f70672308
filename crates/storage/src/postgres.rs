//! PostgreSQL-backed storage, behind the `postgres` feature. Mirrors
//! `palm-daemon`'s `storage::postgres::PostgresStorage`: one JSONB `data`
//! column per row, a handful of indexed columns pulled out for querying,
//! idempotent schema init on connect.

use crate::error::{StorageError, StorageResult};
use crate::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::*;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> StorageResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS user_subscriptions (
                user_id UUID PRIMARY KEY,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS points_transactions (
                tx_id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                kind TEXT NOT NULL,
                related_ref_id UUID,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS points_transactions_user_id ON points_transactions(user_id, created_at);"#,
            r#"CREATE INDEX IF NOT EXISTS points_transactions_related_ref ON points_transactions(related_ref_id, kind);"#,
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                heartbeat_at TIMESTAMPTZ NOT NULL,
                refund_pending BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS jobs_user_id ON jobs(user_id, kind);"#,
            r#"CREATE INDEX IF NOT EXISTS jobs_status ON jobs(status, heartbeat_at);"#,
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                artifact_id UUID PRIMARY KEY,
                kind TEXT NOT NULL,
                slug TEXT,
                owner_user_id UUID,
                visibility TEXT,
                header JSONB NOT NULL,
                content JSONB NOT NULL,
                versions JSONB NOT NULL DEFAULT '[]'
            );
            "#,
            r#"CREATE UNIQUE INDEX IF NOT EXISTS artifacts_slug ON artifacts(slug) WHERE slug IS NOT NULL;"#,
            r#"CREATE INDEX IF NOT EXISTS artifacts_owner ON artifacts(owner_user_id);"#,
            r#"CREATE INDEX IF NOT EXISTS artifacts_marketplace ON artifacts(kind, visibility);"#,
            r#"
            CREATE TABLE IF NOT EXISTS shares (
                share_id UUID PRIMARY KEY,
                artifact_id UUID NOT NULL,
                sharee_email TEXT NOT NULL,
                sharee_id UUID,
                status TEXT NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS shares_sharee ON shares(sharee_id);"#,
            r#"CREATE INDEX IF NOT EXISTS shares_artifact_email ON shares(artifact_id, sharee_email);"#,
            r#"
            CREATE TABLE IF NOT EXISTS purchases (
                grant_id UUID PRIMARY KEY,
                artifact_id UUID NOT NULL,
                buyer_id UUID NOT NULL,
                access_type TEXT NOT NULL,
                is_active BOOLEAN NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS purchases_buyer ON purchases(buyer_id);"#,
            r#"CREATE INDEX IF NOT EXISTS purchases_artifact ON purchases(artifact_id, buyer_id, access_type);"#,
            r#"
            CREATE TABLE IF NOT EXISTS files (
                file_id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                folder_id UUID,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS files_user_folder ON files(user_id, folder_id);"#,
        ];
        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<Value> {
        serde_json::to_value(value).map_err(|e| StorageError::InvalidInput(e.to_string()))
    }

    fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> StorageResult<T> {
        serde_json::from_value(value).map_err(|e| StorageError::InvalidInput(e.to_string()))
    }
}

#[async_trait]
impl SubscriptionStore for PostgresStorage {
    async fn create(&self, sub: UserSubscription) -> StorageResult<()> {
        let data = Self::to_json(&sub)?;
        sqlx::query("INSERT INTO user_subscriptions (user_id, data, updated_at) VALUES ($1, $2, $3)")
            .bind(sub.user_id)
            .bind(data)
            .bind(sub.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> StorageResult<Option<UserSubscription>> {
        let row = sqlx::query("SELECT data FROM user_subscriptions WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }

    async fn cas_points_remaining(
        &self,
        user_id: UserId,
        expected: i64,
        new_value: i64,
        points_total_delta: i64,
        points_used_delta: i64,
    ) -> StorageResult<()> {
        let mut sub = self
            .get(user_id)
            .await?
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
        let data = Self::to_json(&sub)?;
        let result = sqlx::query(
            "UPDATE user_subscriptions SET data = $1, updated_at = $2 \
             WHERE user_id = $3 AND (data->>'points_remaining')::bigint = $4",
        )
        .bind(data)
        .bind(sub.updated_at)
        .bind(user_id)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::CasConflict("points_remaining changed concurrently".into()));
        }
        Ok(())
    }

    async fn cas_earnings_points(
        &self,
        user_id: UserId,
        expected: i64,
        new_value: i64,
    ) -> StorageResult<()> {
        let mut sub = self
            .get(user_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("subscription {user_id}")))?;
        if sub.earnings_points != expected {
            return Err(StorageError::CasConflict(format!(
                "earnings_points expected {expected}, found {}",
                sub.earnings_points
            )));
        }
        sub.earnings_points = new_value;
        sub.updated_at = Utc::now();
        let data = Self::to_json(&sub)?;
        let result = sqlx::query(
            "UPDATE user_subscriptions SET data = $1, updated_at = $2 \
             WHERE user_id = $3 AND (data->>'earnings_points')::bigint = $4",
        )
        .bind(data)
        .bind(sub.updated_at)
        .bind(user_id)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::CasConflict("earnings_points changed concurrently".into()));
        }
        Ok(())
    }

    async fn cas_daily_chat_reset(
        &self,
        user_id: UserId,
        expected_reset_at: DateTime<Utc>,
        new_reset_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut sub = self
            .get(user_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("subscription {user_id}")))?;
        if sub.daily_chat_reset_at != expected_reset_at {
            return Err(StorageError::CasConflict("daily_chat_reset_at changed concurrently".into()));
        }
        sub.daily_chat_count = 0;
        sub.daily_chat_reset_at = new_reset_at;
        let data = Self::to_json(&sub)?;
        let result = sqlx::query(
            "UPDATE user_subscriptions SET data = $1 \
             WHERE user_id = $2 AND (data->>'daily_chat_reset_at')::timestamptz = $3",
        )
        .bind(data)
        .bind(user_id)
        .bind(expected_reset_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::CasConflict("daily_chat_reset_at changed concurrently".into()));
        }
        Ok(())
    }

    async fn increment_daily_chat_count(&self, user_id: UserId) -> StorageResult<()> {
        let mut sub = self
            .get(user_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("subscription {user_id}")))?;
        sub.daily_chat_count += 1;
        let data = Self::to_json(&sub)?;
        sqlx::query("UPDATE user_subscriptions SET data = $1 WHERE user_id = $2")
            .bind(data)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn set_payment_info(&self, user_id: UserId, set: bool) -> StorageResult<()> {
        let mut sub = self
            .get(user_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("subscription {user_id}")))?;
        sub.payment_info_set = set;
        let data = Self::to_json(&sub)?;
        sqlx::query("UPDATE user_subscriptions SET data = $1 WHERE user_id = $2")
            .bind(data)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerTxStore for PostgresStorage {
    async fn append(&self, tx: PointsTransaction) -> StorageResult<()> {
        let data = Self::to_json(&tx)?;
        let related_ref_id = tx.related_ref.as_ref().map(related_ref_uuid);
        sqlx::query(
            "INSERT INTO points_transactions (tx_id, user_id, kind, related_ref_id, created_at, data) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(tx.tx_id)
        .bind(tx.user_id)
        .bind(format!("{:?}", tx.kind))
        .bind(related_ref_id)
        .bind(tx.created_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, tx_id: Uuid) -> StorageResult<Option<PointsTransaction>> {
        let row = sqlx::query("SELECT data FROM points_transactions WHERE tx_id = $1")
            .bind(tx_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        window: QueryWindow,
    ) -> StorageResult<Vec<PointsTransaction>> {
        let limit = if window.limit == 0 { i64::MAX } else { window.limit as i64 };
        let rows = sqlx::query(
            "SELECT data FROM points_transactions WHERE user_id = $1 \
             ORDER BY created_at OFFSET $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(window.offset as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn find_by_related_ref(
        &self,
        related_ref_id: Uuid,
        kind: TransactionKind,
    ) -> StorageResult<Option<PointsTransaction>> {
        let row = sqlx::query(
            "SELECT data FROM points_transactions WHERE related_ref_id = $1 AND kind = $2 LIMIT 1",
        )
        .bind(related_ref_id)
        .bind(format!("{kind:?}"))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }
}

fn related_ref_uuid(r: &core_types::points::RelatedRef) -> Uuid {
    match r {
        core_types::points::RelatedRef::Job(id) => *id,
        core_types::points::RelatedRef::Purchase(id) => *id,
        core_types::points::RelatedRef::Transfer(id) => *id,
        core_types::points::RelatedRef::Withdrawal(id) => *id,
    }
}

#[async_trait]
impl JobStore for PostgresStorage {
    async fn create(&self, job: Job) -> StorageResult<()> {
        let data = Self::to_json(&job)?;
        sqlx::query(
            "INSERT INTO jobs (job_id, user_id, kind, status, heartbeat_at, refund_pending, created_at, data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(job.job_id)
        .bind(job.user_id)
        .bind(format!("{:?}", job.kind))
        .bind(format!("{:?}", job.status))
        .bind(job.heartbeat_at)
        .bind(job.refund_pending)
        .bind(job.created_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> StorageResult<Option<Job>> {
        let row = sqlx::query("SELECT data FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }

    async fn cas_status(
        &self,
        job_id: Uuid,
        expected_from: JobStatus,
        to: JobStatus,
    ) -> StorageResult<bool> {
        let mut job = self
            .get(job_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        if job.status != expected_from || !expected_from.can_transition_to(to) {
            return Ok(false);
        }
        job.status = to;
        job.updated_at = Utc::now();
        let data = Self::to_json(&job)?;
        let result = sqlx::query(
            "UPDATE jobs SET data = $1, status = $2 WHERE job_id = $3 AND status = $4",
        )
        .bind(data)
        .bind(format!("{to:?}"))
        .bind(job_id)
        .bind(format!("{expected_from:?}"))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        progress: u8,
        message: Option<String>,
    ) -> StorageResult<()> {
        let mut job = self
            .get(job_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        job.progress = job.progress.max(progress.min(100));
        if message.is_some() {
            job.message = message;
        }
        job.heartbeat_at = Utc::now();
        job.updated_at = job.heartbeat_at;
        let data = Self::to_json(&job)?;
        sqlx::query("UPDATE jobs SET data = $1, heartbeat_at = $2 WHERE job_id = $3")
            .bind(data)
            .bind(job.heartbeat_at)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn heartbeat(&self, job_id: Uuid) -> StorageResult<()> {
        let mut job = self
            .get(job_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        job.heartbeat_at = Utc::now();
        let data = Self::to_json(&job)?;
        sqlx::query("UPDATE jobs SET data = $1, heartbeat_at = $2 WHERE job_id = $3")
            .bind(data)
            .bind(job.heartbeat_at)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn finalize(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> StorageResult<()> {
        let mut job = self
            .get(job_id)
            .await?
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
        let data = Self::to_json(&job)?;
        sqlx::query("UPDATE jobs SET data = $1, status = $2 WHERE job_id = $3")
            .bind(data)
            .bind(format!("{status:?}"))
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn mark_reservation_resolved(&self, job_id: Uuid) -> StorageResult<()> {
        let mut job = self
            .get(job_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        job.reservation_resolved = true;
        let data = Self::to_json(&job)?;
        sqlx::query("UPDATE jobs SET data = $1 WHERE job_id = $2")
            .bind(data)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn mark_refund_pending(&self, job_id: Uuid, pending: bool) -> StorageResult<()> {
        let mut job = self
            .get(job_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        job.refund_pending = pending;
        let data = Self::to_json(&job)?;
        sqlx::query("UPDATE jobs SET data = $1, refund_pending = $2 WHERE job_id = $3")
            .bind(data)
            .bind(pending)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn increment_attempts(&self, job_id: Uuid) -> StorageResult<u32> {
        let mut job = self
            .get(job_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        job.attempts += 1;
        let data = Self::to_json(&job)?;
        sqlx::query("UPDATE jobs SET data = $1 WHERE job_id = $2")
            .bind(data)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(job.attempts)
    }

    async fn list_orphaned_pending(&self, older_than: DateTime<Utc>) -> StorageResult<Vec<Job>> {
        let rows = sqlx::query("SELECT data FROM jobs WHERE status = 'Pending' AND created_at < $1")
            .bind(older_than)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn list_stale_processing(&self, stale_before: DateTime<Utc>) -> StorageResult<Vec<Job>> {
        let rows =
            sqlx::query("SELECT data FROM jobs WHERE status = 'Processing' AND heartbeat_at < $1")
                .bind(stale_before)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn list_refund_pending(&self) -> StorageResult<Vec<Job>> {
        let rows = sqlx::query("SELECT data FROM jobs WHERE refund_pending = TRUE")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn list_for_user(&self, user_id: UserId, kind: Option<JobKind>) -> StorageResult<Vec<Job>> {
        let rows = match kind {
            Some(k) => sqlx::query("SELECT data FROM jobs WHERE user_id = $1 AND kind = $2")
                .bind(user_id)
                .bind(format!("{k:?}"))
                .fetch_all(&self.pool)
                .await,
            None => sqlx::query("SELECT data FROM jobs WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }
}

#[async_trait]
impl ArtifactRecordStore for PostgresStorage {
    async fn create(&self, record: ArtifactRecord) -> StorageResult<()> {
        let slug = record.header.get("slug").and_then(|v| v.as_str()).map(String::from);
        let owner = record
            .header
            .get("owner_user_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        let visibility = record.header.get("visibility").and_then(|v| v.as_str()).map(String::from);
        let versions = Self::to_json(&record.versions)?;
        sqlx::query(
            "INSERT INTO artifacts (artifact_id, kind, slug, owner_user_id, visibility, header, content, versions) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.artifact_id)
        .bind(format!("{:?}", record.kind))
        .bind(slug)
        .bind(owner)
        .bind(visibility)
        .bind(record.header)
        .bind(record.content)
        .bind(versions)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, artifact_id: ArtifactId) -> StorageResult<Option<ArtifactRecord>> {
        let row = sqlx::query(
            "SELECT artifact_id, kind, header, content, versions FROM artifacts WHERE artifact_id = $1",
        )
        .bind(artifact_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(row_to_artifact_record).transpose()
    }

    async fn find_by_slug(&self, slug: &str) -> StorageResult<Option<ArtifactRecord>> {
        let row = sqlx::query(
            "SELECT artifact_id, kind, header, content, versions FROM artifacts WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(row_to_artifact_record).transpose()
    }

    async fn cas_update_content(
        &self,
        artifact_id: ArtifactId,
        expected_version: u32,
        new_content: serde_json::Value,
        new_header: serde_json::Value,
        snapshot: VersionSnapshot,
    ) -> StorageResult<()> {
        let mut record = self
            .get(artifact_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("artifact {artifact_id}")))?;
        let current_version = record.header.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        if current_version != expected_version {
            return Err(StorageError::CasConflict(format!(
                "artifact {artifact_id} version expected {expected_version}, found {current_version}"
            )));
        }
        record.versions.push(snapshot);
        let versions = Self::to_json(&record.versions)?;
        let slug = new_header.get("slug").and_then(|v| v.as_str()).map(String::from);
        let result = sqlx::query(
            "UPDATE artifacts SET content = $1, header = $2, versions = $3, slug = $4 \
             WHERE artifact_id = $5 AND (header->>'version')::int = $6",
        )
        .bind(new_content)
        .bind(new_header)
        .bind(versions)
        .bind(slug)
        .bind(artifact_id)
        .bind(expected_version as i32)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::CasConflict("artifact version changed concurrently".into()));
        }
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: UserId) -> StorageResult<Vec<ArtifactRecord>> {
        let rows = sqlx::query(
            "SELECT artifact_id, kind, header, content, versions FROM artifacts WHERE owner_user_id = $1",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(row_to_artifact_record).collect()
    }

    async fn list_marketplace(&self, kind: ArtifactKind) -> StorageResult<Vec<ArtifactRecord>> {
        let rows = sqlx::query(
            "SELECT artifact_id, kind, header, content, versions FROM artifacts \
             WHERE kind = $1 AND visibility = 'marketplace'",
        )
        .bind(format!("{kind:?}"))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(row_to_artifact_record).collect()
    }
}

fn row_to_artifact_record(row: sqlx::postgres::PgRow) -> StorageResult<ArtifactRecord> {
    let artifact_id: Uuid = row.try_get("artifact_id").map_err(|e| StorageError::Backend(e.to_string()))?;
    let kind_str: String = row.try_get("kind").map_err(|e| StorageError::Backend(e.to_string()))?;
    let header: Value = row.try_get("header").map_err(|e| StorageError::Backend(e.to_string()))?;
    let content: Value = row.try_get("content").map_err(|e| StorageError::Backend(e.to_string()))?;
    let versions: Value = row.try_get("versions").map_err(|e| StorageError::Backend(e.to_string()))?;
    let kind = match kind_str.as_str() {
        "SlideDeck" => ArtifactKind::SlideDeck,
        "Book" => ArtifactKind::Book,
        "Test" => ArtifactKind::Test,
        _ => ArtifactKind::Image,
    };
    let versions: Vec<VersionSnapshot> =
        serde_json::from_value(versions).map_err(|e| StorageError::InvalidInput(e.to_string()))?;
    Ok(ArtifactRecord { artifact_id, kind, header, content, versions })
}

#[async_trait]
impl ShareStore for PostgresStorage {
    async fn create(&self, share: ShareGrant) -> StorageResult<()> {
        let data = PostgresStorage::to_json(&share)?;
        let status_str = format!("{:?}", share.status);
        let existing = self.find_active(share.artifact_id, &share.sharee_email).await?;
        if existing.is_some() {
            return Err(StorageError::InvariantViolation(
                "active share already exists for (artifact_id, sharee_email)".to_string(),
            ));
        }
        sqlx::query(
            "INSERT INTO shares (share_id, artifact_id, sharee_email, sharee_id, status, data) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(share.share_id)
        .bind(share.artifact_id)
        .bind(&share.sharee_email)
        .bind(share.sharee_id)
        .bind(status_str)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, share_id: Uuid) -> StorageResult<Option<ShareGrant>> {
        let row = sqlx::query("SELECT data FROM shares WHERE share_id = $1")
            .bind(share_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }

    async fn find_active(
        &self,
        artifact_id: ArtifactId,
        sharee_email: &str,
    ) -> StorageResult<Option<ShareGrant>> {
        let row = sqlx::query(
            "SELECT data FROM shares WHERE artifact_id = $1 AND sharee_email = $2 AND status = 'Accepted'",
        )
        .bind(artifact_id)
        .bind(sharee_email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }

    async fn update_status(&self, share_id: Uuid, status: ShareStatus) -> StorageResult<()> {
        let mut share = self
            .get(share_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("share {share_id}")))?;
        if !share.status.can_transition_to(status) {
            return Err(StorageError::InvariantViolation(format!(
                "invalid share transition {:?} -> {:?}",
                share.status, status
            )));
        }
        share.status = status;
        let data = Self::to_json(&share)?;
        sqlx::query("UPDATE shares SET data = $1, status = $2 WHERE share_id = $3")
            .bind(data)
            .bind(format!("{status:?}"))
            .bind(share_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn update_deadline(&self, share_id: Uuid, deadline: Option<DateTime<Utc>>) -> StorageResult<()> {
        let mut share = self
            .get(share_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("share {share_id}")))?;
        share.deadline = deadline;
        let data = Self::to_json(&share)?;
        sqlx::query("UPDATE shares SET data = $1 WHERE share_id = $2")
            .bind(data)
            .bind(share_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_for_sharee(&self, sharee_id: UserId) -> StorageResult<Vec<ShareGrant>> {
        let rows = sqlx::query("SELECT data FROM shares WHERE sharee_id = $1")
            .bind(sharee_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn list_accepted_past_deadline(&self, now: DateTime<Utc>) -> StorageResult<Vec<ShareGrant>> {
        let rows = sqlx::query(
            "SELECT data FROM shares WHERE status = 'Accepted' AND (data->>'deadline')::timestamptz <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }
}

#[async_trait]
impl PurchaseStore for PostgresStorage {
    async fn create(&self, grant: PurchaseGrant) -> StorageResult<()> {
        let data = Self::to_json(&grant)?;
        sqlx::query(
            "INSERT INTO purchases (grant_id, artifact_id, buyer_id, access_type, is_active, data) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(grant.grant_id)
        .bind(grant.artifact_id)
        .bind(grant.buyer_id)
        .bind(format!("{:?}", grant.access_type))
        .bind(grant.is_active)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn find_active(
        &self,
        artifact_id: ArtifactId,
        buyer_id: UserId,
        access_type: AccessType,
    ) -> StorageResult<Option<PurchaseGrant>> {
        let row = sqlx::query(
            "SELECT data FROM purchases WHERE artifact_id = $1 AND buyer_id = $2 \
             AND access_type = $3 AND is_active = TRUE",
        )
        .bind(artifact_id)
        .bind(buyer_id)
        .bind(format!("{access_type:?}"))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }

    async fn get(&self, grant_id: Uuid) -> StorageResult<Option<PurchaseGrant>> {
        let row = sqlx::query("SELECT data FROM purchases WHERE grant_id = $1")
            .bind(grant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }

    async fn cas_increment_view(&self, grant_id: Uuid, expected_view_count: u32) -> StorageResult<()> {
        let mut grant = self
            .get(grant_id)
            .await?
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
        let data = Self::to_json(&grant)?;
        let result = sqlx::query(
            "UPDATE purchases SET data = $1 WHERE grant_id = $2 AND (data->>'view_count')::int = $3",
        )
        .bind(data)
        .bind(grant_id)
        .bind(expected_view_count as i32)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::CasConflict("view_count changed concurrently".into()));
        }
        Ok(())
    }

    async fn list_for_buyer(&self, buyer_id: UserId) -> StorageResult<Vec<PurchaseGrant>> {
        let rows = sqlx::query("SELECT data FROM purchases WHERE buyer_id = $1")
            .bind(buyer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }
}

#[async_trait]
impl FileStore for PostgresStorage {
    async fn create(&self, file: File) -> StorageResult<()> {
        let data = Self::to_json(&file)?;
        sqlx::query("INSERT INTO files (file_id, user_id, folder_id, data) VALUES ($1, $2, $3, $4)")
            .bind(file.file_id)
            .bind(file.user_id)
            .bind(file.folder_id)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, file_id: Uuid) -> StorageResult<Option<File>> {
        let row = sqlx::query("SELECT data FROM files WHERE file_id = $1")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }

    async fn list_for_user(&self, user_id: UserId, folder_id: Option<Uuid>) -> StorageResult<Vec<File>> {
        let rows = match folder_id {
            Some(f) => sqlx::query("SELECT data FROM files WHERE user_id = $1 AND folder_id = $2")
                .bind(user_id)
                .bind(f)
                .fetch_all(&self.pool)
                .await,
            None => sqlx::query("SELECT data FROM files WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Backend(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn delete(&self, file_id: Uuid) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM files WHERE file_id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("file {file_id}")));
        }
        Ok(())
    }
}
