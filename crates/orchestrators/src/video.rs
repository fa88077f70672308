//! `JobKind::VideoExport`: renders a slide deck's narration-synced
//! slides into a downloadable video. There is no `ArtifactKind::Video`
//! in this build, so the rendered URL is returned as the job's result
//! rather than persisted as its own artifact.

use crate::error::{invalid_payload, OrchestratorError};
use crate::payload::parse;
use async_trait::async_trait;
use core_types::Job;
use provider_facade::{ProviderFacade, ProviderRequest, TaskKind};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use worker_runtime::{Checkpoint, ExecutorError, JobExecutor};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct VideoExportPayload {
    deck_artifact_id: uuid::Uuid,
    slide_count: u32,
}

#[derive(Debug, Deserialize)]
struct RenderedVideo {
    video_url: String,
}

pub struct VideoExportExecutor {
    provider: Arc<ProviderFacade>,
}

impl VideoExportExecutor {
    pub fn new(provider: Arc<ProviderFacade>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl JobExecutor for VideoExportExecutor {
    async fn execute(&self, job: &Job, checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
        let payload: VideoExportPayload = parse(job)?;
        let (provider_id, model) = provider_facade::select_model(TaskKind::LayoutDesign);
        let request = ProviderRequest {
            model: model.to_string(),
            prompt: format!("Render a narrated video from deck {} ({} slides)", payload.deck_artifact_id, payload.slide_count),
            input: serde_json::json!({ "deck_artifact_id": payload.deck_artifact_id, "slide_count": payload.slide_count }),
            output_schema: Some(serde_json::json!({
                "type": "object",
                "required": ["video_url"],
                "properties": { "video_url": { "type": "string" } }
            })),
            timeout: PROVIDER_TIMEOUT,
        };
        checkpoint.report(10, Some("render queued".to_string())).await.ok();
        let response = self.provider.call(provider_id, request).await.map_err(OrchestratorError::from)?;
        let rendered: RenderedVideo = serde_json::from_value(response.output)
            .map_err(|e| invalid_payload("provider_output", e))?;
        Ok(serde_json::json!({ "video_url": rendered.video_url }))
    }
}
