//! Generic text-editing AI ops (`JobKind::Editor*`): these act on a
//! caller-supplied text selection rather than a stored artifact, so the
//! result is returned as the job's result rather than persisted —
//! the caller applies it wherever the selection came from.

use crate::error::{invalid_payload, OrchestratorError};
use crate::payload::parse;
use async_trait::async_trait;
use core_types::{Job, JobKind};
use provider_facade::{ProviderFacade, ProviderRequest, TaskKind};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use worker_runtime::{Checkpoint, ExecutorError, JobExecutor};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct EditorPayload {
    text: String,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    target_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EditedText {
    edited_text: String,
}

fn prompt_for(kind: JobKind, payload: &EditorPayload) -> Result<String, ExecutorError> {
    match kind {
        JobKind::EditorEdit => {
            let instruction = payload
                .instruction
                .as_deref()
                .ok_or_else(|| ExecutorError::Fatal("editor_edit requires `instruction`".to_string()))?;
            Ok(format!("Edit the following text per this instruction: {instruction}\n\n{}", payload.text))
        }
        JobKind::EditorTranslate => {
            let target = payload
                .target_language
                .as_deref()
                .ok_or_else(|| ExecutorError::Fatal("editor_translate requires `target_language`".to_string()))?;
            Ok(format!("Translate the following text to {target}:\n\n{}", payload.text))
        }
        JobKind::EditorFormat => Ok(format!("Reformat the following text for readability, preserving meaning:\n\n{}", payload.text)),
        JobKind::EditorBilingual => Ok(format!(
            "Produce a bilingual version of the following text, original alongside a natural translation:\n\n{}",
            payload.text
        )),
        other => Err(ExecutorError::Fatal(format!("editor executor invoked for non-editor job kind {other:?}"))),
    }
}

pub struct EditorExecutor {
    provider: Arc<ProviderFacade>,
}

impl EditorExecutor {
    pub fn new(provider: Arc<ProviderFacade>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl JobExecutor for EditorExecutor {
    async fn execute(&self, job: &Job, _checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
        let payload: EditorPayload = parse(job)?;
        let prompt = prompt_for(job.kind, &payload)?;
        let (provider_id, model) = provider_facade::select_model(TaskKind::ContentRewriting);
        let request = ProviderRequest {
            model: model.to_string(),
            prompt: prompt.clone(),
            input: serde_json::json!({ "text": payload.text }),
            output_schema: Some(serde_json::json!({
                "type": "object",
                "required": ["edited_text"],
                "properties": { "edited_text": { "type": "string" } }
            })),
            timeout: PROVIDER_TIMEOUT,
        };
        let response = self.provider.call(provider_id, request).await.map_err(OrchestratorError::from)?;
        let edited: EditedText = serde_json::from_value(response.output)
            .map_err(|e| invalid_payload("provider_output", e))?;
        Ok(serde_json::json!({ "edited_text": edited.edited_text }))
    }
}
