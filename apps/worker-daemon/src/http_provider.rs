//! Concrete [`Provider`] backing a provider ID with a plain HTTP JSON
//! endpoint. Every real AI provider SDK looks like this from the
//! facade's point of view — one POST, one JSON body in, one JSON body
//! out. Schema validation, repair-retry, and circuit-breaking all live
//! in `ProviderFacade` itself; this impl only has to make the call and
//! classify the outcome.

use async_trait::async_trait;
use core_errors::ProviderErrorKind;
use provider_facade::{Provider, ProviderId, ProviderRequest, ProviderResponse};
use serde_json::json;

pub struct HttpProvider {
    id: ProviderId,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(id: ProviderId, base_url: String, api_key: String) -> Self {
        Self { id, base_url, api_key, client: reqwest::Client::new() }
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderErrorKind> {
        let body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "input": request.input,
            "schema": request.output_schema,
        });

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderErrorKind::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderErrorKind::Policy(text));
        }
        if status.is_server_error() {
            return Err(ProviderErrorKind::Retryable(format!("provider returned {status}")));
        }

        let raw_text = response.text().await.map_err(|e| ProviderErrorKind::Retryable(e.to_string()))?;
        let output: serde_json::Value = serde_json::from_str(&raw_text)
            .map_err(|e| ProviderErrorKind::SchemaError(format!("non-JSON provider response: {e}")))?;

        Ok(ProviderResponse { output, raw_text })
    }
}
