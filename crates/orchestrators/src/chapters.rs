//! Chapter-level book jobs: AI translation of inline chapter text, and
//! mechanical PDF ingestion (split into page-scanned chapters, or import
//! as paginated chapters) that need no provider call at all.

use crate::error::{invalid_payload, OrchestratorError};
use crate::payload::parse;
use artifact_store::ArtifactService;
use async_trait::async_trait;
use core_types::book::{PDF_PAGE_HEIGHT_PX, PDF_PAGE_WIDTH_PX};
use core_types::{Chapter, ChapterContentMode, Job, PageAnnotation, SourceKind};
use provider_facade::{ProviderFacade, ProviderRequest, TaskKind};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use worker_runtime::{Checkpoint, ExecutorError, JobExecutor};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ChapterTranslatePayload {
    artifact_id: uuid::Uuid,
    chapter_id: uuid::Uuid,
    source_text: String,
    target_language: String,
}

#[derive(Debug, Deserialize)]
struct TranslatedText {
    translated_text: String,
}

pub struct ChapterTranslateExecutor {
    provider: Arc<ProviderFacade>,
    artifacts: Arc<ArtifactService>,
}

impl ChapterTranslateExecutor {
    pub fn new(provider: Arc<ProviderFacade>, artifacts: Arc<ArtifactService>) -> Self {
        Self { provider, artifacts }
    }
}

#[async_trait]
impl JobExecutor for ChapterTranslateExecutor {
    async fn execute(&self, job: &Job, _checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
        let payload: ChapterTranslatePayload = parse(job)?;
        let (provider_id, model) = provider_facade::select_model(TaskKind::ContentRewriting);
        let request = ProviderRequest {
            model: model.to_string(),
            prompt: format!("Translate the following chapter text to {}:\n\n{}", payload.target_language, payload.source_text),
            input: serde_json::json!({ "target_language": payload.target_language }),
            output_schema: Some(serde_json::json!({
                "type": "object",
                "required": ["translated_text"],
                "properties": { "translated_text": { "type": "string" } }
            })),
            timeout: PROVIDER_TIMEOUT,
        };
        let response = self.provider.call(provider_id, request).await.map_err(OrchestratorError::from)?;
        let translated: TranslatedText = serde_json::from_value(response.output)
            .map_err(|e| invalid_payload("provider_output", e))?;

        let book = self
            .artifacts
            .update_chapter_content(
                payload.artifact_id,
                payload.chapter_id,
                serde_json::Value::String(translated.translated_text),
                SourceKind::ManualEdit,
                &format!("translated to {}", payload.target_language),
            )
            .await
            .map_err(OrchestratorError::from)?;
        Ok(serde_json::to_value(&book).unwrap_or(serde_json::Value::Null))
    }
}

#[derive(Debug, Deserialize)]
struct PdfSplitPayload {
    artifact_id: uuid::Uuid,
    /// One entry per resulting chapter: the page range's display title
    /// and the already-uploaded page image URLs for that range.
    chapters: Vec<PdfChapterSpec>,
}

#[derive(Debug, Deserialize)]
struct PdfChapterSpec {
    title: String,
    page_image_urls: Vec<String>,
}

/// Splits an uploaded PDF into one scanned-page chapter per requested
/// range. No AI call: this is pure file bookkeeping, priced at zero
/// (`core_config::PricingMap::base_price` for `PdfSplit` is 0).
pub struct PdfSplitExecutor {
    artifacts: Arc<ArtifactService>,
}

impl PdfSplitExecutor {
    pub fn new(artifacts: Arc<ArtifactService>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl JobExecutor for PdfSplitExecutor {
    async fn execute(&self, job: &Job, checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
        let payload: PdfSplitPayload = parse(job)?;
        let book_id = payload.artifact_id;
        let chapters: Vec<Chapter> = payload
            .chapters
            .into_iter()
            .enumerate()
            .map(|(index, spec)| Chapter {
                chapter_id: uuid::Uuid::new_v4(),
                book_id,
                parent_id: None,
                order_index: index as u32,
                title: spec.title,
                content_mode: ChapterContentMode::PdfPages,
                inline_content: None,
                pages: spec
                    .page_image_urls
                    .into_iter()
                    .enumerate()
                    .map(|(page_index, url)| PageAnnotation {
                        page_number: page_index as u32 + 1,
                        background_image_url: url,
                        overlay_elements: Vec::new(),
                        width: PDF_PAGE_WIDTH_PX,
                        height: PDF_PAGE_HEIGHT_PX,
                    })
                    .collect(),
                reading_direction: None,
            })
            .collect();
        checkpoint.report(50, Some(format!("split into {} chapters", chapters.len()))).await.ok();

        let book = self.artifacts.append_chapters(book_id, chapters).await.map_err(OrchestratorError::from)?;
        Ok(serde_json::to_value(&book).unwrap_or(serde_json::Value::Null))
    }
}

#[derive(Debug, Deserialize)]
struct PdfToChapterPayload {
    artifact_id: uuid::Uuid,
    title: String,
    page_image_urls: Vec<String>,
}

/// Imports a whole PDF as a single paginated chapter appended to the
/// book, as opposed to [`PdfSplitExecutor`] which divides it into many.
pub struct PdfToChapterExecutor {
    artifacts: Arc<ArtifactService>,
}

impl PdfToChapterExecutor {
    pub fn new(artifacts: Arc<ArtifactService>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl JobExecutor for PdfToChapterExecutor {
    async fn execute(&self, job: &Job, _checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
        let payload: PdfToChapterPayload = parse(job)?;
        let book_id = payload.artifact_id;
        let chapter = Chapter {
            chapter_id: uuid::Uuid::new_v4(),
            book_id,
            parent_id: None,
            order_index: 0,
            title: payload.title,
            content_mode: ChapterContentMode::PdfPages,
            inline_content: None,
            pages: payload
                .page_image_urls
                .into_iter()
                .enumerate()
                .map(|(page_index, url)| PageAnnotation {
                    page_number: page_index as u32 + 1,
                    background_image_url: url,
                    overlay_elements: Vec::new(),
                    width: PDF_PAGE_WIDTH_PX,
                    height: PDF_PAGE_HEIGHT_PX,
                })
                .collect(),
            reading_direction: None,
        };
        let book = self.artifacts.append_chapters(book_id, vec![chapter]).await.map_err(OrchestratorError::from)?;
        Ok(serde_json::to_value(&book).unwrap_or(serde_json::Value::Null))
    }
}
