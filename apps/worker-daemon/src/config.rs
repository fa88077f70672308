//! Provider endpoint configuration. `core_config::AppConfig` covers the
//! ambient app concerns shared with the HTTP API; it has no notion of
//! where a provider SDK actually lives, since the API process never
//! talks to one directly. Kept separate and env-driven rather than
//! folded into `AppConfig`.

use provider_facade::ProviderId;
use std::env;

#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub id: ProviderId,
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub endpoints: Vec<ProviderEndpoint>,
    pub poll_timeout_secs: u32,
    pub max_attempts: u32,
    pub watchdog_period_secs: u64,
}

fn endpoint_for(id: ProviderId, prefix: &str) -> Option<ProviderEndpoint> {
    let base_url = env::var(format!("{prefix}_BASE_URL")).ok()?;
    let api_key = env::var(format!("{prefix}_API_KEY")).unwrap_or_default();
    Some(ProviderEndpoint { id, base_url, api_key })
}

impl WorkerConfig {
    /// Reads `CLAUDE_BASE_URL`/`CLAUDE_API_KEY`, `GEMINI_BASE_URL`/
    /// `GEMINI_API_KEY`, `IMAGE_MODEL_BASE_URL`/`IMAGE_MODEL_API_KEY`.
    /// A provider with no `*_BASE_URL` set is simply not wired up; any
    /// job kind that needs it will fail fast with a clear error instead
    /// of silently hanging on an unregistered provider id.
    pub fn from_env() -> Self {
        let endpoints = [
            (ProviderId::Claude, "CLAUDE"),
            (ProviderId::Gemini, "GEMINI"),
            (ProviderId::ImageModel, "IMAGE_MODEL"),
        ]
        .into_iter()
        .filter_map(|(id, prefix)| endpoint_for(id, prefix))
        .collect();

        let poll_timeout_secs = env::var("WORKER_POLL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        let max_attempts = env::var("WORKER_MAX_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(3);
        let watchdog_period_secs =
            env::var("WORKER_WATCHDOG_PERIOD_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60);

        Self { endpoints, poll_timeout_secs, max_attempts, watchdog_period_secs }
    }
}
