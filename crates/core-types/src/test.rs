use crate::artifact::ArtifactHeader;
use crate::question::{Answer, Question};
use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    pub price_points: i64,
    pub category: String,
    pub tags: Vec<String>,
    pub language: String,
    pub difficulty: String,
    pub slug: String,
    pub meta_description: String,
}

/// Test-specific fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineTest {
    pub header: ArtifactHeader,
    pub questions: Vec<Question>,
    pub marketplace_config: Option<MarketplaceConfig>,
    pub deadline: Option<DateTime<Utc>>,
    pub time_limit_minutes: Option<u32>,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSubmission {
    pub submission_id: Uuid,
    pub test_id: Uuid,
    pub test_version: u32,
    pub user_id: UserId,
    pub answers: Vec<(Uuid, Answer)>,
    pub score: Option<f64>,
    pub max_score: f64,
    pub submitted_at: DateTime<Utc>,
}
