//! Slide deck generation: outline + slide drafting via the layout-design
//! model, persisted through `artifact-store`'s version-bumping mutators.

use crate::error::{invalid_payload, OrchestratorError};
use crate::payload::parse;
use artifact_store::ArtifactService;
use async_trait::async_trait;
use core_types::{Job, Narration, OutlineEntry, Slide};
use provider_facade::{ProviderFacade, ProviderRequest, TaskKind};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use worker_runtime::{Checkpoint, ExecutorError, JobExecutor};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct SlideGeneratePayload {
    artifact_id: uuid::Uuid,
    topic: String,
    slide_count: u32,
}

#[derive(Debug, Deserialize)]
struct SlideRegeneratePayload {
    artifact_id: uuid::Uuid,
    slide_indices: Vec<u32>,
    instruction: String,
}

#[derive(Debug, Deserialize)]
struct SlideNarrationPayload {
    artifact_id: uuid::Uuid,
    slide_index: u32,
}

#[derive(Debug, Deserialize)]
struct GeneratedDeck {
    outline: Vec<OutlineEntry>,
    slides: Vec<Slide>,
}

#[derive(Debug, Deserialize)]
struct GeneratedNarration {
    audio_url: String,
    subtitle_track_url: Option<String>,
}

pub struct SlideGenerateExecutor {
    provider: Arc<ProviderFacade>,
    artifacts: Arc<ArtifactService>,
}

impl SlideGenerateExecutor {
    pub fn new(provider: Arc<ProviderFacade>, artifacts: Arc<ArtifactService>) -> Self {
        Self { provider, artifacts }
    }
}

fn deck_output_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["outline", "slides"],
        "properties": {
            "outline": { "type": "array" },
            "slides": { "type": "array" }
        }
    })
}

#[async_trait]
impl JobExecutor for SlideGenerateExecutor {
    async fn execute(&self, job: &Job, checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
        let payload: SlideGeneratePayload = parse(job)?;
        let (provider_id, model) = provider_facade::select_model(TaskKind::LayoutDesign);
        let request = ProviderRequest {
            model: model.to_string(),
            prompt: format!(
                "Draft a {}-slide deck outline and slide content for: {}",
                payload.slide_count, payload.topic
            ),
            input: serde_json::json!({ "topic": payload.topic, "slide_count": payload.slide_count }),
            output_schema: Some(deck_output_schema()),
            timeout: PROVIDER_TIMEOUT,
        };
        let response = self.provider.call(provider_id, request).await.map_err(OrchestratorError::from)?;
        checkpoint.report(60, Some("drafted outline".to_string())).await.ok();

        let generated: GeneratedDeck = serde_json::from_value(response.output)
            .map_err(|e| invalid_payload("provider_output", e))?;
        let deck = self
            .artifacts
            .regenerate_slides(payload.artifact_id, generated.outline, generated.slides)
            .await
            .map_err(OrchestratorError::from)?;
        Ok(serde_json::to_value(&deck).unwrap_or(serde_json::Value::Null))
    }
}

pub struct SlideRegenerateExecutor {
    provider: Arc<ProviderFacade>,
    artifacts: Arc<ArtifactService>,
}

impl SlideRegenerateExecutor {
    pub fn new(provider: Arc<ProviderFacade>, artifacts: Arc<ArtifactService>) -> Self {
        Self { provider, artifacts }
    }
}

#[async_trait]
impl JobExecutor for SlideRegenerateExecutor {
    async fn execute(&self, job: &Job, checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
        let payload: SlideRegeneratePayload = parse(job)?;
        let (provider_id, model) = provider_facade::select_model(TaskKind::LayoutDesign);
        let request = ProviderRequest {
            model: model.to_string(),
            prompt: format!(
                "Regenerate slides {:?} per instruction: {}",
                payload.slide_indices, payload.instruction
            ),
            input: serde_json::json!({ "slide_indices": payload.slide_indices, "instruction": payload.instruction }),
            output_schema: Some(deck_output_schema()),
            timeout: PROVIDER_TIMEOUT,
        };
        let response = self.provider.call(provider_id, request).await.map_err(OrchestratorError::from)?;
        checkpoint.report(70, None).await.ok();

        let generated: GeneratedDeck = serde_json::from_value(response.output)
            .map_err(|e| invalid_payload("provider_output", e))?;
        let deck = self
            .artifacts
            .regenerate_slides(payload.artifact_id, generated.outline, generated.slides)
            .await
            .map_err(OrchestratorError::from)?;
        Ok(serde_json::to_value(&deck).unwrap_or(serde_json::Value::Null))
    }
}

pub struct SlideNarrationExecutor {
    provider: Arc<ProviderFacade>,
    artifacts: Arc<ArtifactService>,
}

impl SlideNarrationExecutor {
    pub fn new(provider: Arc<ProviderFacade>, artifacts: Arc<ArtifactService>) -> Self {
        Self { provider, artifacts }
    }
}

#[async_trait]
impl JobExecutor for SlideNarrationExecutor {
    async fn execute(&self, job: &Job, _checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
        let payload: SlideNarrationPayload = parse(job)?;
        let (provider_id, model) = provider_facade::select_model(TaskKind::ContentRewriting);
        let request = ProviderRequest {
            model: model.to_string(),
            prompt: format!("Generate narration audio for slide {}", payload.slide_index),
            input: serde_json::json!({ "slide_index": payload.slide_index }),
            output_schema: Some(serde_json::json!({
                "type": "object",
                "required": ["audio_url"],
                "properties": { "audio_url": { "type": "string" } }
            })),
            timeout: PROVIDER_TIMEOUT,
        };
        let response = self.provider.call(provider_id, request).await.map_err(OrchestratorError::from)?;
        let generated: GeneratedNarration = serde_json::from_value(response.output)
            .map_err(|e| invalid_payload("provider_output", e))?;
        let deck = self
            .artifacts
            .update_slide_narration(
                payload.artifact_id,
                payload.slide_index,
                Narration {
                    audio_url: generated.audio_url,
                    subtitle_track_url: generated.subtitle_track_url,
                },
            )
            .await
            .map_err(OrchestratorError::from)?;
        Ok(serde_json::to_value(&deck).unwrap_or(serde_json::Value::Null))
    }
}
