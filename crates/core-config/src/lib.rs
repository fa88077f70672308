//! Process configuration, layered file + environment, in the style of
//! `palm-daemon`'s `config` crate usage. Also hosts the pricing map and
//! plan quota table — configuration, not code.

use core_types::{JobKind, Plan};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Process-wide configuration. Loaded once at startup in `apps/api-server`
/// and `apps/worker-daemon` via [`AppConfig::load`].
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub server: ServerConfigOpt,
    #[serde(default = "default_welcome_points")]
    pub welcome_points: i64,
    #[serde(default = "default_revenue_share_bps")]
    pub owner_revenue_share_bps: u32,
    #[serde(default = "default_signed_url_ttl_secs")]
    pub signed_url_ttl_secs: u64,
    #[serde(default = "default_job_ttl_days")]
    pub job_ttl_days: i64,
    #[serde(default = "default_job_wall_clock_timeout_secs")]
    pub job_wall_clock_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerConfigOpt {
    pub bind: Option<String>,
}

fn default_welcome_points() -> i64 {
    50
}

/// Revenue split is a system constant: 80% owner / 20% platform at time
/// of writing, expressed in basis points.
fn default_revenue_share_bps() -> u32 {
    8_000
}

fn default_signed_url_ttl_secs() -> u64 {
    3_600
}

fn default_job_ttl_days() -> i64 {
    7
}

fn default_job_wall_clock_timeout_secs() -> u64 {
    30 * 60
}

impl AppConfig {
    /// Layers `config/default.toml`, an environment-specific file, and
    /// `APP_`-prefixed environment variables, matching the teacher's
    /// `config` crate convention.
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));
        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn bind_addr(&self) -> String {
        self.server.bind.clone().unwrap_or_else(default_bind)
    }

    pub fn revenue_split(&self, points_paid: i64) -> (i64, i64) {
        revenue_split(points_paid, self.owner_revenue_share_bps)
    }
}

/// `owner_reward + platform_fee == points_paid`. Uses `floor` for the
/// owner reward, so any rounding remainder goes to the platform fee.
pub fn revenue_split(points_paid: i64, owner_share_bps: u32) -> (i64, i64) {
    let owner_reward = (points_paid * owner_share_bps as i64) / 10_000;
    let platform_fee = points_paid - owner_reward;
    (owner_reward, platform_fee)
}

/// Pricing map. Configuration, not code: every price lives in this one
/// table so the Ledger never hardcodes a cost.
#[derive(Debug, Clone)]
pub struct PricingMap {
    prices: HashMap<JobKind, i64>,
    pub chat_default_llm: i64,
    pub chat_other_llm: i64,
    pub document_ai_op: i64,
    pub image_generation: i64,
    pub slide_format_or_edit: i64,
    pub slide_generation_per_chunk: i64,
    pub audio_narration_per_slide: i64,
    pub test_ai_evaluation: i64,
}

impl Default for PricingMap {
    fn default() -> Self {
        let mut prices = HashMap::new();
        prices.insert(JobKind::SlideGenerate, 5);
        prices.insert(JobKind::SlideRegenerate, 5);
        prices.insert(JobKind::SlideNarrationAudio, 2);
        prices.insert(JobKind::ChapterTranslate, 2);
        prices.insert(JobKind::PdfSplit, 0);
        prices.insert(JobKind::PdfToChapter, 0);
        prices.insert(JobKind::ImageGeneratePhotorealistic, 2);
        prices.insert(JobKind::ImageGenerateStylized, 2);
        prices.insert(JobKind::ImageGenerateLogo, 2);
        prices.insert(JobKind::ImageGenerateBackground, 2);
        prices.insert(JobKind::ImageGenerateMockup, 2);
        prices.insert(JobKind::ImageGenerateSequential, 2);
        prices.insert(JobKind::TestGenerate, 1);
        prices.insert(JobKind::TestEvaluate, 1);
        prices.insert(JobKind::EditorEdit, 2);
        prices.insert(JobKind::EditorTranslate, 2);
        prices.insert(JobKind::EditorFormat, 2);
        prices.insert(JobKind::EditorBilingual, 2);
        prices.insert(JobKind::VideoExport, 5);
        Self {
            prices,
            chat_default_llm: 1,
            chat_other_llm: 2,
            document_ai_op: 2,
            image_generation: 2,
            slide_format_or_edit: 2,
            slide_generation_per_chunk: 5,
            audio_narration_per_slide: 2,
            test_ai_evaluation: 1,
        }
    }
}

impl PricingMap {
    /// Base per-job price for a job kind, before chunk/slide-count
    /// multipliers are applied by the caller.
    pub fn base_price(&self, kind: JobKind) -> i64 {
        self.prices.get(&kind).copied().unwrap_or(0)
    }

    /// Slide generation is priced per <=10-slide chunk.
    pub fn slide_generation_cost(&self, slide_count: u32, chunk_size: u32) -> i64 {
        let chunks = slide_count.div_ceil(chunk_size.max(1));
        self.slide_generation_per_chunk * chunks as i64
    }

    /// Points cost is per-chunk, proportional to slides regenerated.
    pub fn slide_regeneration_cost(&self, slides_regenerated: u32, chunk_size: u32) -> i64 {
        self.slide_generation_cost(slides_regenerated, chunk_size)
    }

    pub fn audio_narration_cost(&self, slide_count: u32) -> i64 {
        self.audio_narration_per_slide * slide_count as i64
    }
}

/// Plan-derived quotas consulted by the Entitlement Resolver.
#[derive(Debug, Clone, Copy)]
pub struct PlanQuota {
    pub free_daily_default_llm_chats: u32,
    pub max_storage_mb: u64,
    pub max_files: u32,
}

pub fn quota_for_plan(plan: Plan) -> PlanQuota {
    match plan {
        Plan::Free => PlanQuota {
            free_daily_default_llm_chats: 10,
            max_storage_mb: 500,
            max_files: 100,
        },
        Plan::Premium => PlanQuota {
            free_daily_default_llm_chats: 100,
            max_storage_mb: 5_000,
            max_files: 1_000,
        },
        Plan::Pro => PlanQuota {
            free_daily_default_llm_chats: 500,
            max_storage_mb: 25_000,
            max_files: 5_000,
        },
        Plan::Vip => PlanQuota {
            free_daily_default_llm_chats: u32::MAX,
            max_storage_mb: 100_000,
            max_files: 50_000,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revenue_split_sums_to_paid() {
        let (reward, fee) = revenue_split(50, 8_000);
        assert_eq!(reward, 40);
        assert_eq!(fee, 10);
        assert_eq!(reward + fee, 50);
    }

    #[test]
    fn slide_generation_cost_chunks_ceiling() {
        let pricing = PricingMap::default();
        // 25 slides / chunk=10 -> 3 chunks (ceiling, not floor).
        assert_eq!(pricing.slide_generation_cost(25, 10), 15);
        assert_eq!(pricing.slide_generation_cost(10, 10), 5);
        assert_eq!(pricing.slide_generation_cost(1, 10), 5);
    }
}
