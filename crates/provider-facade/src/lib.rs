//! Provider Facade: one `call()` entry point for every external AI
//! provider, with model selection, retry classification, schema
//! enforcement, and a streaming sub-interface for chat.
//!
//! Responsibilities mirror the teacher's `resilience` module layout
//! (circuit breaker as its own submodule, `call()` as the narrow façade
//! method callers actually use) with AI-provider semantics grafted on.

pub mod circuit_breaker;

use async_trait::async_trait;
use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use core_errors::ProviderErrorKind;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Claude,
    Gemini,
    ImageModel,
}

/// The kind of task being delegated, used for model selection against a
/// small fixed table of documented defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    ContentRewriting,
    LayoutDesign,
    ImageGeneration,
    SimpleChat,
}

/// Picks `(provider, model)` for a task kind. A plain function, not a
/// trait, since the defaults are a fixed table the spec documents
/// directly, not something callers swap out.
pub fn select_model(task: TaskKind) -> (ProviderId, &'static str) {
    match task {
        TaskKind::ContentRewriting => (ProviderId::Claude, "claude-strong-general"),
        TaskKind::LayoutDesign => (ProviderId::Claude, "claude-strong-reasoning"),
        TaskKind::ImageGeneration => (ProviderId::ImageModel, "image-multimodal-v1"),
        TaskKind::SimpleChat => (ProviderId::Gemini, "gemini-fast-cheap"),
    }
}

#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub prompt: String,
    pub input: Value,
    /// Required JSON schema when the caller needs a structured output
    /// (question lists, outlines, architecture docs).
    pub output_schema: Option<Value>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub output: Value,
    pub raw_text: String,
}

/// One provider SDK, treated as a black-box callable endpoint with a
/// fixed request/response contract.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderErrorKind>;
}

/// A streaming chat sub-interface: the caller is a long-lived HTTP
/// connection, tokens are appended to a buffer as they arrive, and on
/// completion the caller's `Ledger.commit` fires exactly once.
#[async_trait]
pub trait StreamSink: Send + Sync {
    async fn push_token(&mut self, token: &str);
    async fn complete(&mut self);
}

/// Simple in-memory sink that just appends to a `String`, used by
/// callers that don't need a live connection (e.g. tests, or batch
/// narration jobs that buffer the whole response before storing it).
#[derive(Debug, Default)]
pub struct BufferSink {
    pub buffer: String,
    pub completed: bool,
}

#[async_trait]
impl StreamSink for BufferSink {
    async fn push_token(&mut self, token: &str) {
        self.buffer.push_str(token);
    }
    async fn complete(&mut self) {
        self.completed = true;
    }
}

pub struct ProviderFacade {
    providers: HashMap<ProviderId, Arc<dyn Provider>>,
    breakers: HashMap<ProviderId, Arc<CircuitBreaker>>,
}

impl ProviderFacade {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        let mut by_id = HashMap::new();
        let mut breakers = HashMap::new();
        for p in providers {
            let id = p.id();
            breakers.insert(id, Arc::new(CircuitBreaker::new(id, CircuitBreakerConfig::default())));
            by_id.insert(id, p);
        }
        Self {
            providers: by_id,
            breakers,
        }
    }

    /// `call(provider, model, input, options)`, with retry
    /// classification, a one-shot repair retry on schema failure, and a
    /// per-provider timeout applied around the whole attempt.
    #[instrument(skip(self, request))]
    pub async fn call(
        &self,
        provider_id: ProviderId,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderErrorKind> {
        let provider = self
            .providers
            .get(&provider_id)
            .ok_or_else(|| ProviderErrorKind::Retryable("provider not configured".to_string()))?;
        let breaker = self.breakers.get(&provider_id);

        if let Some(b) = breaker {
            if !b.allow_request() {
                return Err(ProviderErrorKind::Retryable(
                    "circuit open for provider".to_string(),
                ));
            }
        }

        let result = self.call_with_schema_repair(provider.as_ref(), request).await;

        if let Some(b) = breaker {
            match &result {
                Ok(_) => b.record_success(),
                Err(e) if e.is_retryable() => b.record_failure(),
                Err(_) => {}
            }
        }
        result
    }

    async fn call_with_schema_repair(
        &self,
        provider: &dyn Provider,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderErrorKind> {
        let first = self.call_with_timeout(provider, &request).await;
        let Some(schema) = request.output_schema.clone() else {
            return first;
        };

        match first {
            Ok(resp) if validate_schema(&schema, &resp.output) => Ok(resp),
            Ok(resp) => {
                warn!("provider output failed schema validation, retrying with repair prompt once");
                let repaired = repair_request(&request, &resp.raw_text);
                let second = self.call_with_timeout(provider, &repaired).await?;
                if validate_schema(&schema, &second.output) {
                    Ok(second)
                } else {
                    Err(ProviderErrorKind::SchemaError(
                        "output still fails schema validation after repair retry".to_string(),
                    ))
                }
            }
            Err(ProviderErrorKind::Retryable(_)) => {
                warn!("malformed/retryable failure, retrying once with stricter prompt");
                let repaired = repair_request(&request, "");
                self.call_with_timeout(provider, &repaired).await
            }
            Err(e) => Err(e),
        }
    }

    async fn call_with_timeout(
        &self,
        provider: &dyn Provider,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderErrorKind> {
        match tokio::time::timeout(request.timeout, provider.call(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderErrorKind::Timeout),
        }
    }
}

fn repair_request(original: &ProviderRequest, bad_output: &str) -> ProviderRequest {
    ProviderRequest {
        model: original.model.clone(),
        prompt: format!(
            "{}\n\nYour previous response was invalid:\n{}\n\nReturn ONLY valid JSON matching the schema.",
            original.prompt, bad_output
        ),
        input: original.input.clone(),
        output_schema: original.output_schema.clone(),
        timeout: original.timeout,
    }
}

fn validate_schema(schema: &Value, output: &Value) -> bool {
    match jsonschema::JSONSchema::compile(schema) {
        Ok(compiled) => compiled.is_valid(output),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        id: ProviderId,
        calls: AtomicU32,
        fail_first_n: u32,
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn id(&self) -> ProviderId {
            self.id
        }
        async fn call(&self, _request: &ProviderRequest) -> Result<ProviderResponse, ProviderErrorKind> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                return Err(ProviderErrorKind::Retryable("transient".to_string()));
            }
            Ok(ProviderResponse {
                output: serde_json::json!({"ok": true}),
                raw_text: "{\"ok\": true}".to_string(),
            })
        }
    }

    fn sample_request() -> ProviderRequest {
        ProviderRequest {
            model: "test-model".to_string(),
            prompt: "hello".to_string(),
            input: serde_json::json!({}),
            output_schema: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn select_model_picks_expected_provider_per_task() {
        assert_eq!(select_model(TaskKind::ImageGeneration).0, ProviderId::ImageModel);
        assert_eq!(select_model(TaskKind::SimpleChat).0, ProviderId::Gemini);
        assert_eq!(select_model(TaskKind::ContentRewriting).0, ProviderId::Claude);
    }

    #[tokio::test]
    async fn retries_once_on_malformed_output_then_succeeds() {
        let provider: Arc<dyn Provider> = Arc::new(FlakyProvider {
            id: ProviderId::Claude,
            calls: AtomicU32::new(0),
            fail_first_n: 1,
        });
        let facade = ProviderFacade::new(vec![provider]);
        let response = facade.call(ProviderId::Claude, sample_request()).await.unwrap();
        assert_eq!(response.output["ok"], true);
    }

    #[tokio::test]
    async fn schema_validated_output_is_accepted_without_repair() {
        let provider: Arc<dyn Provider> = Arc::new(FlakyProvider {
            id: ProviderId::Claude,
            calls: AtomicU32::new(0),
            fail_first_n: 0,
        });
        let facade = ProviderFacade::new(vec![provider]);
        let mut request = sample_request();
        request.output_schema = Some(serde_json::json!({
            "type": "object",
            "required": ["ok"],
            "properties": { "ok": { "type": "boolean" } }
        }));
        let response = facade.call(ProviderId::Claude, request).await.unwrap();
        assert_eq!(response.output["ok"], true);
    }

    #[tokio::test]
    async fn open_circuit_short_circuits_without_calling_provider() {
        let provider: Arc<dyn Provider> = Arc::new(FlakyProvider {
            id: ProviderId::Claude,
            calls: AtomicU32::new(0),
            fail_first_n: 100,
        });
        let facade = ProviderFacade::new(vec![provider]);
        for _ in 0..6 {
            let _ = facade.call(ProviderId::Claude, sample_request()).await;
        }
        let err = facade.call(ProviderId::Claude, sample_request()).await.unwrap_err();
        assert!(matches!(err, ProviderErrorKind::Retryable(_)));
    }
}
