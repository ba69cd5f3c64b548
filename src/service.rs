use std::sync::Arc;

use crate::chat::{AnswerEngine, AnswerError};
use crate::config::{AppConfig, LimitsConfig};
use crate::ingest::chunker::ChunkingError;
use crate::ingest::{content_sha256, IngestError, Ingestor};
use crate::llm::{LanguageModel, LimitedModel};
use crate::models::{Answer, Document, SuggestedQuestionSet};
use crate::ollama::OllamaClient;
use crate::retrieval::ContextSelector;
use crate::store::{DocumentStore, SuggestionCache};
use crate::suggest::{SuggestionEngine, SuggestionError};

/// Application-facing boundary over the ingestion and question-answering
/// pipeline. Owns the caller-side retry policy for model calls.
#[derive(Clone)]
pub struct QaService {
    ingestor: Ingestor,
    selector: ContextSelector,
    answers: AnswerEngine,
    suggestions: SuggestionEngine,
    documents: DocumentStore,
    cache: SuggestionCache,
    limits: LimitsConfig,
}

impl QaService {
    /// Wires the pipeline against the configured Ollama server. Answer and
    /// suggestion calls share one concurrency limit.
    pub fn from_config(config: &AppConfig) -> Result<Self, ChunkingError> {
        let answer_client = OllamaClient::new(
            config.ollama_base_url.clone(),
            config.models.answer_model.clone(),
            config.limits.request_timeout,
        );
        let limited: Arc<dyn LanguageModel> =
            Arc::new(LimitedModel::new(Arc::new(answer_client), &config.limits));

        let suggestion_model: Arc<dyn LanguageModel> =
            if config.models.suggestion_model == config.models.answer_model {
                limited.clone()
            } else {
                let client = OllamaClient::new(
                    config.ollama_base_url.clone(),
                    config.models.suggestion_model.clone(),
                    config.limits.request_timeout,
                );
                Arc::new(LimitedModel::new(Arc::new(client), &config.limits))
            };

        Self::with_models(config, limited, suggestion_model)
    }

    pub fn with_models(
        config: &AppConfig,
        answer_model: Arc<dyn LanguageModel>,
        suggestion_model: Arc<dyn LanguageModel>,
    ) -> Result<Self, ChunkingError> {
        let ingestor = Ingestor::new(config.chunking.clone())?;
        let suggestions = SuggestionEngine::new(
            suggestion_model,
            config.suggestions.clone(),
            ingestor.chunker().clone(),
        );

        Ok(Self {
            selector: ContextSelector::new(config.selection.clone()),
            answers: AnswerEngine::new(answer_model, config.answer.clone()),
            suggestions,
            ingestor,
            documents: DocumentStore::new(),
            cache: SuggestionCache::new(),
            limits: config.limits.clone(),
        })
    }

    /// Extracts and chunks a PDF, then registers it. Identical bytes that were
    /// already ingested return the existing document.
    pub async fn ingest(
        &self,
        pdf_bytes: Vec<u8>,
        original_filename: Option<String>,
    ) -> Result<Arc<Document>, IngestError> {
        if let Some(existing) = self.documents.find_by_hash(&content_sha256(&pdf_bytes)) {
            tracing::info!(document_id = %existing.id, "PDF already ingested; reusing");
            return Ok(existing);
        }

        let document = self.ingestor.ingest(pdf_bytes, original_filename).await?;
        let candidate = document.id.clone();
        let registered = self.documents.insert(document);
        if registered.id != candidate {
            tracing::info!(
                document_id = %registered.id,
                "same PDF registered concurrently; reusing"
            );
        }
        Ok(registered)
    }

    pub fn document(&self, id: &str) -> Option<Arc<Document>> {
        self.documents.get(id)
    }

    pub fn documents(&self) -> Vec<Arc<Document>> {
        self.documents.list()
    }

    /// Removes a document and everything derived from it.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.documents.remove(id).is_some();
        self.cache.invalidate(id);
        if removed {
            tracing::info!(document_id = id, "deleted document");
        }
        removed
    }

    pub async fn answer(&self, document: &Document, question: &str) -> Result<Answer, AnswerError> {
        let context = self.selector.select(question, &document.chunks);

        let attempts = self.limits.retry_attempts.max(1);
        let mut backoff = self.limits.retry_backoff;
        let mut attempt = 1;
        loop {
            match self.answers.answer(question, &context).await {
                Ok(answer) => return Ok(answer),
                Err(err) if attempt < attempts => {
                    tracing::warn!(
                        document_id = %document.id,
                        attempt,
                        error = %err,
                        "answer attempt failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(document_id = %document.id, error = %err, "answer failed");
                    return Err(err);
                }
            }
        }
    }

    /// Suggested questions for a registered document, computed once and
    /// cached for the document's lifetime. Failures are not cached, and a set
    /// finished after the document was deleted is returned but not kept.
    pub async fn suggest(
        &self,
        document: &Document,
    ) -> Result<Arc<SuggestedQuestionSet>, SuggestionError> {
        if !self.documents.contains(&document.id) {
            return Err(SuggestionError::UnknownDocument(document.id.clone()));
        }
        self.cache
            .get_or_try_insert_with(
                &document.id,
                || self.documents.contains(&document.id),
                || self.suggestions.suggest(&document.id, &document.text),
            )
            .await
    }
}
