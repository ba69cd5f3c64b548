//! Narrow capability interface for text-completion models.
//!
//! Chunking, selection and prompt building only ever see [`LanguageModel`],
//! so the concrete service behind it can be swapped freely.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::LimitsConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_output_tokens: usize,
    pub temperature: f32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("model service unavailable: {0}")]
    Unavailable(String),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("too many concurrent model calls")]
    Throttled,
    #[error("model refused to answer: {0}")]
    Refused(String),
}

impl ModelError {
    /// Failures worth one more attempt by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Unavailable(_) | ModelError::Timeout(_) | ModelError::Throttled
        )
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError>;
}

/// Bounds outstanding calls to an inner model and enforces a per-call
/// timeout. Callers wait up to `queue_timeout` for a slot before getting
/// [`ModelError::Throttled`].
pub struct LimitedModel {
    inner: Arc<dyn LanguageModel>,
    permits: Arc<Semaphore>,
    queue_timeout: Duration,
    request_timeout: Duration,
}

impl LimitedModel {
    pub fn new(inner: Arc<dyn LanguageModel>, limits: &LimitsConfig) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(limits.max_concurrent_calls.max(1))),
            queue_timeout: limits.queue_timeout,
            request_timeout: limits.request_timeout,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl LanguageModel for LimitedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        let _permit = match tokio::time::timeout(self.queue_timeout, self.permits.acquire()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(ModelError::Unavailable(
                    "model limiter closed".to_string(),
                ))
            }
            Err(_) => {
                tracing::warn!(
                    waited_ms = self.queue_timeout.as_millis() as u64,
                    "model call throttled"
                );
                return Err(ModelError::Throttled);
            }
        };

        match tokio::time::timeout(self.request_timeout, self.inner.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "model call timed out"
                );
                Err(ModelError::Timeout(self.request_timeout))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ScriptedModel, StalledModel};
    use super::*;

    fn limits(max_concurrent_calls: usize) -> LimitsConfig {
        LimitsConfig {
            max_concurrent_calls,
            queue_timeout: Duration::from_millis(50),
            request_timeout: Duration::from_secs(5),
            ..LimitsConfig::default()
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            prompt: "hello".to_string(),
            max_output_tokens: 16,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn passes_through_inner_response() {
        let model = LimitedModel::new(Arc::new(ScriptedModel::replying("hi")), &limits(1));
        assert_eq!(model.complete(&request()).await.unwrap(), "hi");
        assert_eq!(model.available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let model = LimitedModel::new(Arc::new(StalledModel), &limits(1));
        let err = model.complete(&request()).await.unwrap_err();
        assert_eq!(err, ModelError::Timeout(Duration::from_secs(5)));
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_limiter_throttles() {
        let model = Arc::new(LimitedModel::new(Arc::new(StalledModel), &limits(1)));

        let busy = {
            let model = model.clone();
            tokio::spawn(async move { model.complete(&request()).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(model.available_permits(), 0);

        let err = model.complete(&request()).await.unwrap_err();
        assert_eq!(err, ModelError::Throttled);
        busy.abort();
    }

    #[test]
    fn refusals_are_not_transient() {
        assert!(!ModelError::Refused("policy".to_string()).is_transient());
    }
}
