//! Per-job-kind pipelines: each `JobKind` gets a `worker_runtime::JobExecutor`
//! that parses its job's payload, calls whatever the work actually needs
//! (the provider facade, or nothing at all for mechanical jobs), and
//! persists the result through `artifact-store`. `apps/worker-daemon`
//! wires one `WorkerRuntime` per kind using [`build_executor`].

pub mod chapters;
pub mod editor;
pub mod error;
pub mod images;
pub mod payload;
pub mod slides;
pub mod test_exec;
pub mod video;

use artifact_store::ArtifactService;
use core_types::JobKind;
use provider_facade::ProviderFacade;
use std::sync::Arc;
use worker_runtime::JobExecutor;

/// Everything a [`JobExecutor`] in this crate might need; not every
/// executor uses every field (e.g. [`editor::EditorExecutor`] never
/// touches `artifacts`).
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub provider: Arc<ProviderFacade>,
    pub artifacts: Arc<ArtifactService>,
}

/// Constructs the executor for one job kind. `apps/worker-daemon` calls
/// this once per kind it runs a worker loop for.
pub fn build_executor(kind: JobKind, deps: &OrchestratorDeps) -> Arc<dyn JobExecutor> {
    match kind {
        JobKind::SlideGenerate => Arc::new(slides::SlideGenerateExecutor::new(deps.provider.clone(), deps.artifacts.clone())),
        JobKind::SlideRegenerate => {
            Arc::new(slides::SlideRegenerateExecutor::new(deps.provider.clone(), deps.artifacts.clone()))
        }
        JobKind::SlideNarrationAudio => {
            Arc::new(slides::SlideNarrationExecutor::new(deps.provider.clone(), deps.artifacts.clone()))
        }
        JobKind::ChapterTranslate => {
            Arc::new(chapters::ChapterTranslateExecutor::new(deps.provider.clone(), deps.artifacts.clone()))
        }
        JobKind::PdfSplit => Arc::new(chapters::PdfSplitExecutor::new(deps.artifacts.clone())),
        JobKind::PdfToChapter => Arc::new(chapters::PdfToChapterExecutor::new(deps.artifacts.clone())),
        JobKind::ImageGeneratePhotorealistic
        | JobKind::ImageGenerateStylized
        | JobKind::ImageGenerateLogo
        | JobKind::ImageGenerateBackground
        | JobKind::ImageGenerateMockup
        | JobKind::ImageGenerateSequential => {
            Arc::new(images::ImageGenerateExecutor::new(deps.provider.clone(), deps.artifacts.clone()))
        }
        JobKind::TestGenerate => Arc::new(test_exec::TestGenerateExecutor::new(deps.provider.clone(), deps.artifacts.clone())),
        JobKind::TestEvaluate => Arc::new(test_exec::TestEvaluateExecutor::new(deps.provider.clone())),
        JobKind::EditorEdit | JobKind::EditorTranslate | JobKind::EditorFormat | JobKind::EditorBilingual => {
            Arc::new(editor::EditorExecutor::new(deps.provider.clone()))
        }
        JobKind::VideoExport => Arc::new(video::VideoExportExecutor::new(deps.provider.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_errors::ProviderErrorKind;
    use provider_facade::{Provider, ProviderId, ProviderRequest, ProviderResponse};
    use storage::InMemoryStorage;
    use uuid::Uuid;
    use worker_runtime::{Checkpoint, ExecutorError};

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn id(&self) -> ProviderId {
            ProviderId::Claude
        }
        async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderErrorKind> {
            let output = serde_json::json!({ "edited_text": format!("edited: {}", request.input["text"]) });
            Ok(ProviderResponse { output, raw_text: String::new() })
        }
    }

    struct ImageProvider;

    #[async_trait]
    impl Provider for ImageProvider {
        fn id(&self) -> ProviderId {
            ProviderId::ImageModel
        }
        async fn call(&self, _request: &ProviderRequest) -> Result<ProviderResponse, ProviderErrorKind> {
            Ok(ProviderResponse {
                output: serde_json::json!({ "image_url": "https://cdn.example/out.png" }),
                raw_text: String::new(),
            })
        }
    }

    fn sample_job(kind: JobKind, payload: serde_json::Value) -> core_types::Job {
        let now = chrono::Utc::now();
        core_types::Job {
            job_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind,
            status: core_types::JobStatus::Processing,
            progress: 0,
            message: None,
            payload,
            result: None,
            error: None,
            points_reserved: 2,
            reservation_resolved: false,
            refund_pending: false,
            attempts: 0,
            created_at: now,
            updated_at: now,
            heartbeat_at: now,
        }
    }

    #[tokio::test]
    async fn editor_executor_echoes_provider_output() {
        let provider = Arc::new(ProviderFacade::new(vec![Arc::new(EchoProvider)]));
        let executor = editor::EditorExecutor::new(provider);
        let storage = Arc::new(InMemoryStorage::default());
        let job_store: Arc<dyn storage::JobStore> = storage.clone();
        let job = sample_job(
            JobKind::EditorFormat,
            serde_json::json!({ "text": "hello world" }),
        );
        let checkpoint = Checkpoint::for_job(job_store.as_ref(), job.job_id);
        let result = executor.execute(&job, &checkpoint).await.unwrap();
        assert_eq!(result["edited_text"], "edited: \"hello world\"");
    }

    #[tokio::test]
    async fn editor_executor_rejects_edit_without_instruction() {
        let provider = Arc::new(ProviderFacade::new(vec![Arc::new(EchoProvider)]));
        let executor = editor::EditorExecutor::new(provider);
        let storage = Arc::new(InMemoryStorage::default());
        let job_store: Arc<dyn storage::JobStore> = storage.clone();
        let job = sample_job(JobKind::EditorEdit, serde_json::json!({ "text": "hello" }));
        let checkpoint = Checkpoint::for_job(job_store.as_ref(), job.job_id);
        let result = executor.execute(&job, &checkpoint).await;
        assert!(matches!(result, Err(ExecutorError::Fatal(_))));
    }

    #[tokio::test]
    async fn build_executor_picks_image_executor_for_every_image_kind() {
        let provider = Arc::new(ProviderFacade::new(vec![Arc::new(ImageProvider)]));
        let artifacts = Arc::new(ArtifactService::new(Arc::new(InMemoryStorage::default())));
        let deps = OrchestratorDeps { provider, artifacts };
        for kind in [
            JobKind::ImageGeneratePhotorealistic,
            JobKind::ImageGenerateStylized,
            JobKind::ImageGenerateLogo,
            JobKind::ImageGenerateBackground,
            JobKind::ImageGenerateMockup,
            JobKind::ImageGenerateSequential,
        ] {
            let _executor = build_executor(kind, &deps);
        }
    }
}
