//! Shared application state: the process-scoped core struct that replaces
//! module-level service singletons with explicit, passed-in handles.
//! Mirrors `palm-daemon::api::rest::state::AppState`: one `Clone` struct
//! of `Arc`-wrapped services, constructed once in `server.rs` and handed
//! to every handler via axum's `State` extractor.

use crate::auth::SharedIdentityVerifier;
use crate::blob::BlobStore;
use access::AccessEngine;
use artifact_store::ArtifactService;
use chrono::{DateTime, Utc};
use core_config::{AppConfig, PricingMap};
use entitlement::EntitlementResolver;
use job_queue::JobQueue;
use ledger::Ledger;
use marketplace::MarketplaceService;
use std::sync::Arc;
use storage::CoreStorage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn CoreStorage>,
    pub ledger: Arc<Ledger>,
    pub entitlement: Arc<EntitlementResolver>,
    pub access: Arc<AccessEngine>,
    pub queue: Arc<JobQueue>,
    pub artifacts: Arc<ArtifactService>,
    pub marketplace: Arc<MarketplaceService>,
    pub pricing: Arc<PricingMap>,
    pub config: Arc<AppConfig>,
    pub identity: SharedIdentityVerifier,
    pub blobs: Arc<dyn BlobStore>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn CoreStorage>,
        ledger: Arc<Ledger>,
        entitlement: Arc<EntitlementResolver>,
        access: Arc<AccessEngine>,
        queue: Arc<JobQueue>,
        artifacts: Arc<ArtifactService>,
        marketplace: Arc<MarketplaceService>,
        pricing: Arc<PricingMap>,
        config: Arc<AppConfig>,
        identity: SharedIdentityVerifier,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            storage,
            ledger,
            entitlement,
            access,
            queue,
            artifacts,
            marketplace,
            pricing,
            config,
            identity,
            blobs,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
