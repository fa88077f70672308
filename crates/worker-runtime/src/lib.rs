//! Worker Runtime: the generic claim/execute/commit-or-refund loop every
//! job kind shares. The concrete per-kind work (calling
//! the provider facade, writing artifact content) is supplied by an
//! `orchestrators`-crate [`JobExecutor`] impl; this crate owns only the
//! lifecycle around it — heartbeats, retry-with-backoff, and the
//! watchdog that fails jobs whose heartbeat goes stale.

pub mod error;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Job, JobKind, JobStatus, UserId};
use error::{WorkerError, WorkerResult};
use ledger::Ledger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storage::JobStore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// What a [`JobExecutor`] reports back mid-run: execute is a sequence of
/// checkpoints updating `heartbeat_at`, `progress`, `message`.
pub struct Checkpoint<'a> {
    storage: &'a dyn JobStore,
    job_id: Uuid,
}

impl<'a> Checkpoint<'a> {
    /// Exposed so an `orchestrators`-crate executor can be exercised in
    /// a unit test without going through a full `WorkerRuntime` pass.
    pub fn for_job(storage: &'a dyn JobStore, job_id: Uuid) -> Self {
        Self { storage, job_id }
    }

    pub async fn report(&self, progress: u8, message: Option<String>) -> WorkerResult<()> {
        self.storage.update_progress(self.job_id, progress, message).await?;
        self.storage.heartbeat(self.job_id).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum ExecutorError {
    Retryable(String),
    Fatal(String),
}

#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job, checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError>;
}

/// The queue operations the loop needs, factored out of `job_queue::JobQueue`
/// so the loop itself can be exercised without a live Redis connection.
#[async_trait]
pub trait JobBackbone: Send + Sync {
    async fn claim(&self, kind: JobKind, timeout_secs: u32) -> WorkerResult<Option<Job>>;
    async fn requeue(&self, job: &Job) -> WorkerResult<()>;
}

#[async_trait]
impl JobBackbone for job_queue::JobQueue {
    async fn claim(&self, kind: JobKind, timeout_secs: u32) -> WorkerResult<Option<Job>> {
        Ok(job_queue::JobQueue::claim(self, kind, timeout_secs).await?)
    }

    async fn requeue(&self, job: &Job) -> WorkerResult<()> {
        Ok(job_queue::JobQueue::requeue(self, job).await?)
    }
}

pub struct WorkerRuntime {
    queue: Arc<dyn JobBackbone>,
    storage: Arc<dyn JobStore>,
    ledger: Arc<Ledger>,
    kind: JobKind,
    executor: Arc<dyn JobExecutor>,
    max_attempts: u32,
}

impl WorkerRuntime {
    pub fn new(
        queue: Arc<dyn JobBackbone>,
        storage: Arc<dyn JobStore>,
        ledger: Arc<Ledger>,
        kind: JobKind,
        executor: Arc<dyn JobExecutor>,
        max_attempts: u32,
    ) -> Self {
        Self { queue, storage, ledger, kind, executor, max_attempts }
    }

    /// One pass of the worker loop body.
    /// Returns `true` if a job was claimed (whether or not it succeeded).
    #[instrument(skip(self))]
    pub async fn run_once(&self, poll_timeout_secs: u32) -> WorkerResult<bool> {
        let Some(job) = self.queue.claim(self.kind, poll_timeout_secs).await? else {
            return Ok(false);
        };
        if job.status != JobStatus::Pending {
            return Ok(false); // stale: already claimed, cancelled, or reaped twice
        }
        if !self.storage.cas_status(job.job_id, JobStatus::Pending, JobStatus::Processing).await? {
            return Ok(false); // another worker won the race
        }
        self.process_claimed(job).await?;
        Ok(true)
    }

    async fn process_claimed(&self, job: Job) -> WorkerResult<()> {
        let checkpoint = Checkpoint { storage: self.storage.as_ref(), job_id: job.job_id };
        match self.executor.execute(&job, &checkpoint).await {
            Ok(result) => {
                self.ledger.commit(job.job_id).await?;
                self.storage.finalize(job.job_id, JobStatus::Completed, Some(result), None).await?;
                info!(job_id = %job.job_id, kind = ?job.kind, "job completed");
                Ok(())
            }
            Err(ExecutorError::Retryable(msg)) => self.retry_or_fail(job, msg).await,
            Err(ExecutorError::Fatal(msg)) => self.fail(&job, msg).await,
        }
    }

    async fn retry_or_fail(&self, job: Job, msg: String) -> WorkerResult<()> {
        let attempts = self.storage.increment_attempts(job.job_id).await?;
        if attempts < self.max_attempts {
            self.storage.cas_status(job.job_id, JobStatus::Processing, JobStatus::Pending).await?;
            self.queue.requeue(&job).await?;
            warn!(job_id = %job.job_id, attempts, "job requeued after retryable error: {msg}");
            Ok(())
        } else {
            self.fail(&job, format!("exhausted {attempts} attempts: {msg}")).await
        }
    }

    async fn fail(&self, job: &Job, error: String) -> WorkerResult<()> {
        self.ledger.refund(job.user_id, job.job_id, "job_failed").await?;
        self.storage.finalize(job.job_id, JobStatus::Failed, None, Some(error)).await?;
        Ok(())
    }

    pub fn spawn(self: Arc<Self>, poll_timeout_secs: u32) -> WorkerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let running_task = running.clone();
        let runtime = self.clone();
        let task = tokio::spawn(async move {
            while running_task.load(Ordering::Relaxed) {
                if let Err(e) = runtime.run_once(poll_timeout_secs).await {
                    warn!(error = %e, kind = ?runtime.kind, "worker pass failed");
                }
            }
        });
        WorkerHandle { running, task }
    }
}

pub struct WorkerHandle {
    running: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    pub fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        self.task.abort();
    }
}

/// Marks jobs whose `heartbeat_at` predates `stale_before` as failed and
/// refunds their reservation. A watchdog marks jobs older than 3x the
/// expected step interval as failed and refunds points.
#[instrument(skip(storage, ledger))]
pub async fn sweep_stale_jobs(
    storage: &dyn JobStore,
    ledger: &Ledger,
    stale_before: DateTime<Utc>,
) -> WorkerResult<u32> {
    let stale = storage.list_stale_processing(stale_before).await?;
    let mut failed = 0;
    for job in stale {
        ledger.refund(job.user_id, job.job_id, "watchdog_stale_heartbeat").await?;
        storage
            .finalize(job.job_id, JobStatus::Failed, None, Some("heartbeat expired".to_string()))
            .await?;
        failed += 1;
    }
    Ok(failed)
}

pub fn spawn_watchdog(
    storage: Arc<dyn JobStore>,
    ledger: Arc<Ledger>,
    period: std::time::Duration,
    stale_after: chrono::Duration,
) -> WatchdogHandle {
    let running = Arc::new(AtomicBool::new(true));
    let running_task = running.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        while running_task.load(Ordering::Relaxed) {
            ticker.tick().await;
            let stale_before = Utc::now() - stale_after;
            match sweep_stale_jobs(storage.as_ref(), ledger.as_ref(), stale_before).await {
                Ok(n) if n > 0 => info!(failed = n, "watchdog failed stale jobs"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "watchdog pass failed"),
            }
        }
    });
    WatchdogHandle { running, task }
}

pub struct WatchdogHandle {
    running: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchdogHandle {
    pub fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        self.task.abort();
    }
}

/// Reference to the user who owns a job, used by callers building a
/// [`JobExecutor`] that needs to address the ledger or storage on the
/// user's behalf without re-threading it through every call.
pub fn job_owner(job: &Job) -> UserId {
    job.user_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::UserId as _UserId;
    use std::sync::atomic::AtomicU32;
    use storage::InMemoryStorage;

    fn sample_job(kind: JobKind, points_reserved: i64) -> Job {
        let now = Utc::now();
        Job {
            job_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind,
            status: JobStatus::Pending,
            progress: 0,
            message: None,
            payload: serde_json::json!({}),
            result: None,
            error: None,
            points_reserved,
            reservation_resolved: false,
            refund_pending: false,
            attempts: 0,
            created_at: now,
            updated_at: now,
            heartbeat_at: now,
        }
    }

    struct AlwaysSucceeds;
    #[async_trait]
    impl JobExecutor for AlwaysSucceeds {
        async fn execute(&self, _job: &Job, checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
            checkpoint.report(50, Some("halfway".to_string())).await.ok();
            Ok(serde_json::json!({"ok": true}))
        }
    }

    struct FailsNTimes {
        remaining: AtomicU32,
    }
    #[async_trait]
    impl JobExecutor for FailsNTimes {
        async fn execute(&self, _job: &Job, _checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(ExecutorError::Retryable("flaky provider".to_string()))
            } else {
                Ok(serde_json::json!({"ok": true}))
            }
        }
    }

    #[tokio::test]
    async fn successful_job_commits_reservation_and_completes() {
        let storage = Arc::new(InMemoryStorage::default());
        let ledger = Arc::new(Ledger::new(storage.clone()));
        let user_id: _UserId = Uuid::new_v4();
        ledger.register(user_id, 100).await.unwrap();

        let mut job = sample_job(JobKind::SlideGenerate, 10);
        job.user_id = user_id;
        let job_id = job.job_id;
        storage.create(job.clone()).await.unwrap();
        ledger.reserve(user_id, 10, "slide_generate", job_id).await.unwrap();

        let runtime = WorkerRuntime {
            queue: fake_backbone(),
            storage: storage.clone(),
            ledger: ledger.clone(),
            kind: JobKind::SlideGenerate,
            executor: Arc::new(AlwaysSucceeds),
            max_attempts: 3,
        };
        runtime.process_claimed(job).await.unwrap();

        let stored = storage.get(job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(ledger.balance(user_id).await.unwrap().points_remaining, 90);
    }

    #[tokio::test]
    async fn fatal_error_refunds_points() {
        let storage = Arc::new(InMemoryStorage::default());
        let ledger = Arc::new(Ledger::new(storage.clone()));
        let user_id: _UserId = Uuid::new_v4();
        ledger.register(user_id, 100).await.unwrap();

        let mut job = sample_job(JobKind::TestGenerate, 15);
        job.user_id = user_id;
        let job_id = job.job_id;
        storage.create(job.clone()).await.unwrap();
        ledger.reserve(user_id, 15, "test_generate", job_id).await.unwrap();

        struct AlwaysFails;
        #[async_trait]
        impl JobExecutor for AlwaysFails {
            async fn execute(&self, _job: &Job, _checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
                Err(ExecutorError::Fatal("content policy violation".to_string()))
            }
        }

        let runtime = WorkerRuntime {
            queue: fake_backbone(),
            storage: storage.clone(),
            ledger: ledger.clone(),
            kind: JobKind::TestGenerate,
            executor: Arc::new(AlwaysFails),
            max_attempts: 3,
        };
        runtime.process_claimed(job).await.unwrap();

        let stored = storage.get(job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(ledger.balance(user_id).await.unwrap().points_remaining, 100);
    }

    #[tokio::test]
    async fn retryable_error_requeues_until_attempts_exhausted() {
        let storage = Arc::new(InMemoryStorage::default());
        let ledger = Arc::new(Ledger::new(storage.clone()));
        let user_id: _UserId = Uuid::new_v4();
        ledger.register(user_id, 100).await.unwrap();

        let mut job = sample_job(JobKind::SlideGenerate, 5);
        job.user_id = user_id;
        let job_id = job.job_id;
        storage.create(job.clone()).await.unwrap();
        ledger.reserve(user_id, 5, "slide_generate", job_id).await.unwrap();

        let runtime = WorkerRuntime {
            queue: fake_backbone(),
            storage: storage.clone(),
            ledger: ledger.clone(),
            kind: JobKind::SlideGenerate,
            executor: Arc::new(FailsNTimes { remaining: AtomicU32::new(2) }),
            max_attempts: 5,
        };
        // first pass: fails, requeues (attempts=1 < 5)
        runtime.process_claimed(job.clone()).await.unwrap();
        let after_first = storage.get(job_id).await.unwrap().unwrap();
        assert_eq!(after_first.status, JobStatus::Pending);
        assert_eq!(after_first.attempts, 1);
    }

    struct FakeBackbone {
        requeued: std::sync::Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl JobBackbone for FakeBackbone {
        async fn claim(&self, _kind: JobKind, _timeout_secs: u32) -> WorkerResult<Option<Job>> {
            Ok(None)
        }

        async fn requeue(&self, job: &Job) -> WorkerResult<()> {
            self.requeued.lock().unwrap().push(job.job_id);
            Ok(())
        }
    }

    fn fake_backbone() -> Arc<dyn JobBackbone> {
        Arc::new(FakeBackbone { requeued: std::sync::Mutex::new(Vec::new()) })
    }
}
