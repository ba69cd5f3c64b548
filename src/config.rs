use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::ingest::chunker::ChunkConfig;
use crate::retrieval::{SelectionConfig, SelectionMode};

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub answer_model: String,
    pub suggestion_model: String,
}

#[derive(Clone, Debug)]
pub struct AnswerConfig {
    pub max_output_tokens: usize,
    pub temperature: f32,
    pub max_answer_chars: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 500,
            temperature: 0.1,
            max_answer_chars: 4_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SuggestionConfig {
    pub count: usize,
    pub max_question_chars: usize,
    pub max_source_chars: usize,
    pub max_output_tokens: usize,
    pub temperature: f32,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            count: 5,
            max_question_chars: 200,
            max_source_chars: 30_000,
            max_output_tokens: 400,
            temperature: 0.4,
        }
    }
}

/// Limits applied around every model call and by the caller-side retry.
#[derive(Clone, Debug)]
pub struct LimitsConfig {
    pub max_concurrent_calls: usize,
    pub queue_timeout: Duration,
    pub request_timeout: Duration,
    pub retry_attempts: usize,
    pub retry_backoff: Duration,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 2,
            queue_timeout: Duration::from_millis(10_000),
            request_timeout: Duration::from_secs(60),
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub ollama_base_url: String,
    pub models: ModelConfig,
    pub chunking: ChunkConfig,
    pub selection: SelectionConfig,
    pub answer: AnswerConfig,
    pub suggestions: SuggestionConfig,
    pub limits: LimitsConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let answer_model =
            env::var("ANSWER_MODEL").unwrap_or_else(|_| "qwen2.5:7b-instruct".to_string());
        let suggestion_model =
            env::var("SUGGESTION_MODEL").unwrap_or_else(|_| answer_model.clone());

        let chunk_defaults = ChunkConfig::default();
        let selection_defaults = SelectionConfig::default();
        let answer_defaults = AnswerConfig::default();
        let suggestion_defaults = SuggestionConfig::default();
        let limit_defaults = LimitsConfig::default();

        let mode = match env::var("CONTEXT_MODE")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            Ok("leading") | Ok("full") => SelectionMode::Leading,
            _ => SelectionMode::Lexical,
        };

        Self {
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string()),
            models: ModelConfig {
                answer_model,
                suggestion_model,
            },
            chunking: ChunkConfig {
                max_chunk_chars: env_or("CHUNK_MAX_CHARS", chunk_defaults.max_chunk_chars),
                overlap_chars: env_or("CHUNK_OVERLAP_CHARS", chunk_defaults.overlap_chars),
                boundary_window: env_or("CHUNK_BOUNDARY_WINDOW", chunk_defaults.boundary_window),
            },
            selection: SelectionConfig {
                max_chunks: env_or("CONTEXT_MAX_CHUNKS", selection_defaults.max_chunks),
                max_context_chars: env_or(
                    "CONTEXT_MAX_CHARS",
                    selection_defaults.max_context_chars,
                ),
                mode,
                weight_by_rarity: selection_defaults.weight_by_rarity,
            },
            answer: AnswerConfig {
                max_output_tokens: env_or("MAX_OUTPUT_TOKENS", answer_defaults.max_output_tokens),
                temperature: answer_defaults.temperature,
                max_answer_chars: env_or("ANSWER_MAX_CHARS", answer_defaults.max_answer_chars),
            },
            suggestions: SuggestionConfig {
                count: env_or("SUGGESTION_COUNT", suggestion_defaults.count),
                max_question_chars: env_or(
                    "SUGGESTION_MAX_CHARS",
                    suggestion_defaults.max_question_chars,
                ),
                max_source_chars: env_or(
                    "SUGGESTION_SOURCE_CHARS",
                    suggestion_defaults.max_source_chars,
                ),
                ..suggestion_defaults
            },
            limits: LimitsConfig {
                max_concurrent_calls: env_or(
                    "MODEL_MAX_CONCURRENCY",
                    limit_defaults.max_concurrent_calls,
                )
                .max(1),
                queue_timeout: Duration::from_millis(env_or(
                    "MODEL_QUEUE_TIMEOUT_MS",
                    limit_defaults.queue_timeout.as_millis() as u64,
                )),
                request_timeout: Duration::from_secs(env_or(
                    "MODEL_TIMEOUT_SECS",
                    limit_defaults.request_timeout.as_secs(),
                )),
                retry_attempts: env_or("MODEL_RETRY_ATTEMPTS", limit_defaults.retry_attempts)
                    .max(1),
                retry_backoff: Duration::from_millis(env_or(
                    "MODEL_RETRY_BACKOFF_MS",
                    limit_defaults.retry_backoff.as_millis() as u64,
                )),
            },
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_values_fall_back_to_default() {
        env::set_var("PDFQA_TEST_NUMBER", "not-a-number");
        assert_eq!(env_or("PDFQA_TEST_NUMBER", 42usize), 42);

        env::set_var("PDFQA_TEST_NUMBER", " 17 ");
        assert_eq!(env_or("PDFQA_TEST_NUMBER", 42usize), 17);
        env::remove_var("PDFQA_TEST_NUMBER");
    }
}
