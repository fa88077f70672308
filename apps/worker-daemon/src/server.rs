//! Daemon setup and lifecycle. Mirrors `api-server::server::Server`: build
//! every long-lived service once, spawn one `WorkerRuntime` per job kind
//! plus the watchdog, and wait for a shutdown signal.

use crate::config::WorkerConfig;
use crate::http_provider::HttpProvider;
use artifact_store::ArtifactService;
use core_config::AppConfig;
use core_types::JobKind;
use job_queue::JobQueue;
use ledger::Ledger;
use orchestrators::{build_executor, OrchestratorDeps};
use provider_facade::{Provider, ProviderFacade};
use std::sync::Arc;
use std::time::Duration;
use storage::PostgresStorage;
use worker_runtime::{spawn_watchdog, WatchdogHandle, WorkerHandle, WorkerRuntime};

/// Every kind this daemon process claims work for. A deployment that
/// wants a dedicated process per kind, so a slow provider can't starve
/// the others, can run this binary multiple times with `WORKER_JOB_KINDS`
/// set instead.
const ALL_KINDS: &[JobKind] = &[
    JobKind::SlideGenerate,
    JobKind::SlideRegenerate,
    JobKind::SlideNarrationAudio,
    JobKind::ChapterTranslate,
    JobKind::PdfSplit,
    JobKind::PdfToChapter,
    JobKind::ImageGeneratePhotorealistic,
    JobKind::ImageGenerateStylized,
    JobKind::ImageGenerateLogo,
    JobKind::ImageGenerateBackground,
    JobKind::ImageGenerateMockup,
    JobKind::ImageGenerateSequential,
    JobKind::TestGenerate,
    JobKind::TestEvaluate,
    JobKind::EditorEdit,
    JobKind::EditorTranslate,
    JobKind::EditorFormat,
    JobKind::EditorBilingual,
    JobKind::VideoExport,
];

fn kinds_from_env() -> Vec<JobKind> {
    let Ok(raw) = std::env::var("WORKER_JOB_KINDS") else {
        return ALL_KINDS.to_vec();
    };
    raw.split(',')
        .filter_map(|name| serde_json::from_value(serde_json::Value::String(name.trim().to_string())).ok())
        .collect()
}

pub struct Server {
    worker_handles: Vec<WorkerHandle>,
    watchdog: WatchdogHandle,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let worker_config = WorkerConfig::from_env();

        let postgres = Arc::new(
            PostgresStorage::new(&config.database.url, config.database.max_connections, 10).await?,
        );

        let ledger = Arc::new(Ledger::new(postgres.clone()));
        let artifacts = Arc::new(ArtifactService::new(postgres.clone()));
        let queue = Arc::new(JobQueue::connect(&config.redis.url, postgres.clone()).await?);

        let providers: Vec<Arc<dyn Provider>> = worker_config
            .endpoints
            .iter()
            .map(|e| Arc::new(HttpProvider::new(e.id, e.base_url.clone(), e.api_key.clone())) as Arc<dyn Provider>)
            .collect();
        let provider_facade = Arc::new(ProviderFacade::new(providers));
        let deps = OrchestratorDeps { provider: provider_facade, artifacts: artifacts.clone() };

        let kinds = kinds_from_env();
        tracing::info!(?kinds, "starting worker pools");
        let worker_handles = kinds
            .into_iter()
            .map(|kind| {
                let executor = build_executor(kind, &deps);
                let runtime = Arc::new(WorkerRuntime::new(
                    queue.clone(),
                    postgres.clone(),
                    ledger.clone(),
                    kind,
                    executor,
                    worker_config.max_attempts,
                ));
                runtime.spawn(worker_config.poll_timeout_secs)
            })
            .collect();

        let watchdog = spawn_watchdog(
            postgres.clone(),
            ledger.clone(),
            Duration::from_secs(worker_config.watchdog_period_secs),
            chrono::Duration::seconds(3 * config.job_wall_clock_timeout_secs as i64),
        );

        Ok(Self { worker_handles, watchdog })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        shutdown_signal().await;
        tracing::info!("worker-daemon shutting down");
        for handle in self.worker_handles {
            handle.stop();
        }
        self.watchdog.stop();
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received terminate signal, initiating graceful shutdown"),
    }
}
