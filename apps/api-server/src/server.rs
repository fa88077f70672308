//! Server setup and lifecycle. Mirrors `palm-daemon::server::Server`:
//! build every long-lived service once, hand `Arc`s into `AppState`, bind
//! and serve with graceful shutdown.

use crate::auth::{SharedIdentityVerifier, StaticTokenVerifier};
use crate::blob::{BlobStore, LocalDiskBlobStore};
use crate::router::create_router;
use crate::state::AppState;
use access::AccessEngine;
use artifact_store::ArtifactService;
use core_config::AppConfig;
use entitlement::EntitlementResolver;
use job_queue::JobQueue;
use ledger::Ledger;
use marketplace::MarketplaceService;
use std::sync::Arc;
use std::time::Duration;
use storage::PostgresStorage;
use tokio::net::TcpListener;

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let postgres = Arc::new(
            PostgresStorage::new(
                &config.database.url,
                config.database.max_connections,
                10,
            )
            .await?,
        );
        let storage: Arc<dyn storage::CoreStorage> = postgres.clone();

        let ledger = Arc::new(Ledger::new(postgres.clone()));
        let entitlement = Arc::new(EntitlementResolver::new(postgres.clone(), ledger.clone()));
        let access = Arc::new(AccessEngine::new(postgres.clone()));
        let queue = Arc::new(JobQueue::connect(&config.redis.url, postgres.clone()).await?);
        let artifacts = Arc::new(ArtifactService::new(postgres.clone()));
        let marketplace = Arc::new(MarketplaceService::new(postgres.clone(), ledger.clone()));
        let pricing = Arc::new(core_config::PricingMap::default());

        let identity: SharedIdentityVerifier = Arc::new(StaticTokenVerifier);
        let blobs: Arc<dyn BlobStore> = Arc::new(LocalDiskBlobStore::new("./data/blobs"));

        let state = AppState::new(
            storage, ledger, entitlement, access, queue, artifacts, marketplace, pricing, config.clone(), identity,
            blobs,
        );

        Ok(Self { config, state })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "api-server listening");

        let reaper = self.state.queue.clone().spawn_reaper(Duration::from_secs(30), chrono::Duration::minutes(10));
        let sweep = self.state.access.clone().spawn_expiration_sweep(Duration::from_secs(60));

        let app = create_router(self.state);
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("api-server shutting down");
        reaper.stop();
        sweep.stop();
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
