use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::llm::{CompletionRequest, LanguageModel, ModelError};

/// Text completion against a local Ollama server via `/api/generate`.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate_text(
        &self,
        prompt: &str,
        num_predict: usize,
        temperature: f32,
    ) -> Result<String, ModelError> {
        #[derive(Serialize)]
        struct GenerateReq<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: GenerateOptions,
        }

        #[derive(Serialize)]
        struct GenerateOptions {
            num_predict: usize,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct GenerateResp {
            response: String,
        }

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&GenerateReq {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    num_predict,
                    temperature,
                },
            })
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let response = response
            .json::<GenerateResp>()
            .await
            .map_err(|err| self.transport_error(err))?;

        Ok(response.response.trim().to_string())
    }

    fn transport_error(&self, err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout(self.timeout)
        } else if err.is_decode() {
            ModelError::Unavailable(format!("failed to decode ollama response: {err}"))
        } else {
            ModelError::Unavailable(format!("failed to call ollama generate endpoint: {err}"))
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        let result = self
            .generate_text(
                &request.prompt,
                request.max_output_tokens,
                request.temperature,
            )
            .await;
        if let Err(err) = &result {
            tracing::warn!(model = %self.model, error = %err, "ollama generate failed");
        }
        result
    }
}

fn status_error(status: StatusCode, body: &str) -> ModelError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ModelError::Throttled;
    }
    ModelError::Unavailable(format!(
        "ollama /api/generate returned {status}: {}",
        normalize_err_body(body)
    ))
}

fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(err) = json.get("error").and_then(|v| v.as_str()) {
            return err.to_string();
        }
    }

    trimmed.to_string()
}
