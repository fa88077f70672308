//! Online test generation and evaluation. Generation drafts a question
//! set from a topic; evaluation grades a submission, auto-scoring every
//! question type `artifact_store::grading::grade` covers and delegating
//! essay questions to the provider.

use crate::error::{invalid_payload, OrchestratorError};
use crate::payload::parse;
use artifact_store::grading::grade;
use artifact_store::ArtifactService;
use async_trait::async_trait;
use chrono::Utc;
use core_types::{Answer, Job, Question, QuestionType, TestSubmission};
use provider_facade::{ProviderFacade, ProviderRequest, TaskKind};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use worker_runtime::{Checkpoint, ExecutorError, JobExecutor};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Deserialize)]
struct TestGeneratePayload {
    artifact_id: uuid::Uuid,
    topic: String,
    question_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestions {
    questions: Vec<Question>,
}

pub struct TestGenerateExecutor {
    provider: Arc<ProviderFacade>,
    artifacts: Arc<ArtifactService>,
}

impl TestGenerateExecutor {
    pub fn new(provider: Arc<ProviderFacade>, artifacts: Arc<ArtifactService>) -> Self {
        Self { provider, artifacts }
    }
}

#[async_trait]
impl JobExecutor for TestGenerateExecutor {
    async fn execute(&self, job: &Job, checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
        let payload: TestGeneratePayload = parse(job)?;
        let (provider_id, model) = provider_facade::select_model(TaskKind::ContentRewriting);
        let request = ProviderRequest {
            model: model.to_string(),
            prompt: format!("Draft {} test questions about: {}", payload.question_count, payload.topic),
            input: serde_json::json!({ "topic": payload.topic, "question_count": payload.question_count }),
            output_schema: Some(serde_json::json!({
                "type": "object",
                "required": ["questions"],
                "properties": { "questions": { "type": "array" } }
            })),
            timeout: PROVIDER_TIMEOUT,
        };
        let response = self.provider.call(provider_id, request).await.map_err(OrchestratorError::from)?;
        checkpoint.report(70, Some("drafted questions".to_string())).await.ok();

        let generated: GeneratedQuestions = serde_json::from_value(response.output)
            .map_err(|e| invalid_payload("provider_output", e))?;
        let test = self
            .artifacts
            .update_questions(payload.artifact_id, generated.questions)
            .await
            .map_err(OrchestratorError::from)?;
        Ok(serde_json::to_value(&test).unwrap_or(serde_json::Value::Null))
    }
}

#[derive(Debug, Deserialize)]
struct TestEvaluatePayload {
    test_id: uuid::Uuid,
    test_version: u32,
    user_id: uuid::Uuid,
    questions: Vec<Question>,
    answers: Vec<Answer>,
}

#[derive(Debug, Deserialize)]
struct EssayScore {
    score_fraction: f64,
}

/// Essay questions have no deterministic grader; the provider scores
/// them as a fraction of `max_points`, clamped into range in case the
/// model returns something outside [0, 1].
pub struct TestEvaluateExecutor {
    provider: Arc<ProviderFacade>,
}

impl TestEvaluateExecutor {
    pub fn new(provider: Arc<ProviderFacade>) -> Self {
        Self { provider }
    }

    async fn grade_one(&self, question: &Question, answer: &Answer) -> Result<f64, OrchestratorError> {
        if let (QuestionType::Essay { prompt }, Answer::Essay { text }) = (&question.content, answer) {
            let (provider_id, model) = provider_facade::select_model(TaskKind::ContentRewriting);
            let request = ProviderRequest {
                model: model.to_string(),
                prompt: format!("Grade this essay answer to \"{prompt}\" as a fraction of full credit:\n\n{text}"),
                input: serde_json::json!({ "prompt": prompt, "answer": text }),
                output_schema: Some(serde_json::json!({
                    "type": "object",
                    "required": ["score_fraction"],
                    "properties": { "score_fraction": { "type": "number" } }
                })),
                timeout: PROVIDER_TIMEOUT,
            };
            let response = self.provider.call(provider_id, request).await?;
            let scored: EssayScore =
                serde_json::from_value(response.output).map_err(|e| invalid_payload("provider_output", e))?;
            Ok(scored.score_fraction.clamp(0.0, 1.0) * question.max_points)
        } else {
            Ok(grade(question, answer))
        }
    }
}

#[async_trait]
impl JobExecutor for TestEvaluateExecutor {
    async fn execute(&self, job: &Job, checkpoint: &Checkpoint<'_>) -> Result<serde_json::Value, ExecutorError> {
        let payload: TestEvaluatePayload = parse(job)?;
        if payload.questions.len() != payload.answers.len() {
            return Err(ExecutorError::Fatal("questions/answers length mismatch".to_string()));
        }

        let mut score = 0.0;
        let mut max_score = 0.0;
        let mut answers = Vec::with_capacity(payload.answers.len());
        for (question, answer) in payload.questions.iter().zip(payload.answers.into_iter()) {
            max_score += question.max_points;
            score += self.grade_one(question, &answer).await?;
            answers.push((question.question_id, answer));
        }
        checkpoint.report(90, Some("graded".to_string())).await.ok();

        let submission = TestSubmission {
            submission_id: uuid::Uuid::new_v4(),
            test_id: payload.test_id,
            test_version: payload.test_version,
            user_id: payload.user_id,
            answers,
            score: Some(score),
            max_score,
            submitted_at: Utc::now(),
        };
        Ok(serde_json::to_value(&submission).unwrap_or(serde_json::Value::Null))
    }
}
