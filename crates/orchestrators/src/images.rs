//! Image generation: one executor handles every `JobKind::ImageGenerate*`
//! variant, since they differ only in which style is passed to the image
//! model — the persistence step is identical.

use crate::error::{invalid_payload, OrchestratorError};
use crate::payload::parse;
use artifact_store::ArtifactService;
use async_trait::async_trait;
use core_types::{ImageStyle, Job, JobKind};
use provider_facade::{ProviderFacade, ProviderRequest, TaskKind};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use worker_runtime::{Checkpoint, ExecutorError, JobExecutor};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Deserialize)]
struct ImageGeneratePayload {
    artifact_id: uuid::Uuid,
    prompt: String,
    source_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImageUrl {
    image_url: String,
}

fn style_for(kind: JobKind) -> Option<ImageStyle> {
    match kind {
        JobKind::ImageGeneratePhotorealistic => Some(ImageStyle::Photorealistic),
        JobKind::ImageGenerateStylized => Some(ImageStyle::Stylized),
        JobKind::ImageGenerateLogo => Some(ImageStyle::Logo),
        JobKind::ImageGenerateBackground => Some(ImageStyle::Background),
        JobKind::ImageGenerateMockup => Some(ImageStyle::Mockup),
        JobKind::ImageGenerateSequential => Some(ImageStyle::Sequential),
        _ => None,
    }
}

pub struct ImageGenerateExecutor {
    provider: Arc<ProviderFacade>,
    artifacts: Arc<ArtifactService>,
}

impl ImageGenerateExecutor {
    pub fn new(provider: Arc<ProviderFacade>, artifacts: Arc<ArtifactService>) -> Self {
        Self { provider, artifacts }
    }
}

#[async_trait]
impl JobExecutor for ImageGenerateExecutor {
    async fn execute(&self, job: &Job, checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
        let style = style_for(job.kind).ok_or_else(|| {
            ExecutorError::Fatal(format!("image executor invoked for non-image job kind {:?}", job.kind))
        })?;
        let payload: ImageGeneratePayload = parse(job)?;
        let (provider_id, model) = provider_facade::select_model(TaskKind::ImageGeneration);
        let mut input = serde_json::json!({ "prompt": payload.prompt, "style": style });
        if let Some(source) = &payload.source_image_url {
            input["source_image_url"] = serde_json::Value::String(source.clone());
        }
        let request = ProviderRequest {
            model: model.to_string(),
            prompt: payload.prompt.clone(),
            input,
            output_schema: Some(serde_json::json!({
                "type": "object",
                "required": ["image_url"],
                "properties": { "image_url": { "type": "string" } }
            })),
            timeout: PROVIDER_TIMEOUT,
        };
        let response = self.provider.call(provider_id, request).await.map_err(OrchestratorError::from)?;
        checkpoint.report(80, Some("image generated".to_string())).await.ok();

        let generated: GeneratedImageUrl = serde_json::from_value(response.output)
            .map_err(|e| invalid_payload("provider_output", e))?;
        let image = self
            .artifacts
            .finalize_image(payload.artifact_id, generated.image_url)
            .await
            .map_err(OrchestratorError::from)?;
        Ok(serde_json::to_value(&image).unwrap_or(serde_json::Value::Null))
    }
}
