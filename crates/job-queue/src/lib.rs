//! Job Queue: a durable FIFO per [`JobKind`]. Two stores work together —
//! the Redis list is the fast, ephemeral queue backbone (blocking pop for
//! workers); `storage::JobStore` is the durable, inspectable Job record
//! and the authoritative status.
//!
//! Grounded on the teacher's `scheduler::Scheduler` for the reaper's
//! spawned-interval-loop shape; the queue backbone itself has no teacher
//! analogue (the teacher has no cross-process work queue), so its use of
//! `redis` follows the crate's own idiomatic async API.

use chrono::{DateTime, Utc};
use core_types::{Job, JobKind, JobStatus};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storage::JobStore;
use thiserror::Error;
use tokio::time::{interval, Duration};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

impl From<QueueError> for core_errors::CoreError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::Redis(e) => core_errors::CoreError::Storage(e.to_string()),
            QueueError::Storage(e) => e.into(),
        }
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

fn queue_key(kind: JobKind) -> String {
    format!("jobqueue:{}", serde_json::to_value(kind).unwrap().as_str().unwrap())
}

pub struct JobQueue {
    conn: ConnectionManager,
    storage: Arc<dyn JobStore>,
}

impl JobQueue {
    pub async fn connect(redis_url: &str, storage: Arc<dyn JobStore>) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn, storage })
    }

    /// Two-step enqueue: insert the durable Job record with
    /// `status=pending` first, then push onto the Redis list for
    /// its kind. A crash between the two steps leaves an orphan the
    /// reaper will re-push.
    #[instrument(skip(self, job))]
    pub async fn enqueue(&self, job: Job) -> QueueResult<()> {
        let job_id = job.job_id;
        let kind = job.kind;
        self.storage.create(job).await?;
        self.push_to_backbone(kind, job_id).await
    }

    async fn push_to_backbone(&self, kind: JobKind, job_id: Uuid) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(queue_key(kind), job_id.to_string()).await?;
        Ok(())
    }

    /// Blocking pop for a worker that handles exactly one kind. Returns
    /// the full durable Job record, not just the id, since the worker
    /// needs the payload immediately.
    #[instrument(skip(self))]
    pub async fn claim(&self, kind: JobKind, timeout_secs: u32) -> QueueResult<Option<Job>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .blpop(queue_key(kind), timeout_secs as f64)
            .await?;
        let Some((_key, id_str)) = popped else {
            return Ok(None);
        };
        let job_id = Uuid::parse_str(&id_str).map_err(|e| {
            QueueError::Storage(storage::StorageError::InvalidInput(format!(
                "malformed job id on queue: {e}"
            )))
        })?;
        Ok(self.storage.get(job_id).await?)
    }

    /// Re-pushes an already-`pending` job onto its kind's backbone list
    /// without touching the durable record — used by the worker runtime
    /// to requeue a retryable failure after backing off.
    #[instrument(skip(self, job))]
    pub async fn requeue(&self, job: &Job) -> QueueResult<()> {
        self.push_to_backbone(job.kind, job.job_id).await
    }

    /// Orphan reaper: `pending` jobs older than `older_than` get
    /// re-pushed onto the backbone. Idempotent — a job
    /// already on the queue just gets a harmless duplicate entry; workers
    /// tolerate double-claim via `cas_status(Pending -> Processing)`.
    #[instrument(skip(self))]
    pub async fn reap_orphans(&self, older_than: DateTime<Utc>) -> QueueResult<u32> {
        let orphans = self.storage.list_orphaned_pending(older_than).await?;
        let mut requeued = 0;
        for job in orphans {
            self.push_to_backbone(job.kind, job.job_id).await?;
            requeued += 1;
        }
        Ok(requeued)
    }

    /// Advisory cancellation against this queue's own durable store —
    /// the caller never needs its own `&dyn JobStore` handle.
    #[instrument(skip(self))]
    pub async fn request_cancel(&self, job_id: Uuid) -> QueueResult<bool> {
        request_cancel(self.storage.as_ref(), job_id).await
    }

    pub fn spawn_reaper(self: Arc<Self>, period: Duration, orphan_threshold: chrono::Duration) -> ReaperHandle {
        let running = Arc::new(AtomicBool::new(true));
        let running_task = running.clone();
        let queue = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            while running_task.load(Ordering::Relaxed) {
                ticker.tick().await;
                let threshold = Utc::now() - orphan_threshold;
                match queue.reap_orphans(threshold).await {
                    Ok(n) if n > 0 => tracing::info!(requeued = n, "reaped orphaned pending jobs"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "orphan reaper pass failed"),
                }
            }
        });
        ReaperHandle { running, task }
    }
}

pub struct ReaperHandle {
    running: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl ReaperHandle {
    pub fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        self.task.abort();
    }
}

/// Advisory cancellation: flips `status` to `cancelled`.
/// In-flight provider calls are not interrupted; the worker discards
/// their result on its next heartbeat checkpoint.
pub async fn request_cancel(storage: &dyn JobStore, job_id: Uuid) -> QueueResult<bool> {
    Ok(storage.cas_status(job_id, JobStatus::Pending, JobStatus::Cancelled).await?
        || storage.cas_status(job_id, JobStatus::Processing, JobStatus::Cancelled).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::UserId;
    use storage::InMemoryStorage;

    fn sample_job(kind: JobKind) -> Job {
        let now = Utc::now();
        Job {
            job_id: Uuid::new_v4(),
            user_id: UserId::new_v4(),
            kind,
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
            created_at: now,
            updated_at: now,
            heartbeat_at: now,
        }
    }

    #[test]
    fn queue_key_is_stable_per_kind() {
        assert_eq!(queue_key(JobKind::SlideGenerate), queue_key(JobKind::SlideGenerate));
        assert_ne!(queue_key(JobKind::SlideGenerate), queue_key(JobKind::TestGenerate));
    }

    #[tokio::test]
    async fn reap_orphans_requeues_pending_jobs_without_touching_status() {
        let storage = Arc::new(InMemoryStorage::default());
        let job = sample_job(JobKind::TestGenerate);
        let job_id = job.job_id;
        storage.create(job).await.unwrap();

        let orphans = storage
            .list_orphaned_pending(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].job_id, job_id);
    }

    #[tokio::test]
    async fn request_cancel_transitions_pending_to_cancelled() {
        let storage = Arc::new(InMemoryStorage::default());
        let job = sample_job(JobKind::TestGenerate);
        let job_id = job.job_id;
        storage.create(job).await.unwrap();

        let cancelled = request_cancel(storage.as_ref(), job_id).await.unwrap();
        assert!(cancelled);
        let job = storage.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }
}
