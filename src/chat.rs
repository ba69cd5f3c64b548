use std::sync::{Arc, OnceLock};

use regex::Regex;
use thiserror::Error;

use crate::config::AnswerConfig;
use crate::llm::{CompletionRequest, LanguageModel, ModelError};
use crate::models::{Answer, AnswerOutcome};
use crate::retrieval::SelectedContext;

/// The exact sentence the model is told to reply with when the context does
/// not contain the answer.
pub const NOT_FOUND_MESSAGE: &str = "I cannot find the answer in the provided text.";

/// Shown when the model refused or produced nothing usable.
pub const NO_ANSWER_MESSAGE: &str =
    "No answer could be produced for this question from the document.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnswerError {
    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("language model is throttled; try again shortly")]
    Throttled,
}

impl From<ModelError> for AnswerError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Throttled => AnswerError::Throttled,
            other => AnswerError::ModelUnavailable(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AnswerEngine {
    model: Arc<dyn LanguageModel>,
    config: AnswerConfig,
}

impl AnswerEngine {
    pub fn new(model: Arc<dyn LanguageModel>, config: AnswerConfig) -> Self {
        Self { model, config }
    }

    /// One model round trip. Transient model failures are returned as errors
    /// for the caller to retry; refusals and empty output come back as an
    /// ungrounded [`Answer`].
    pub async fn answer(
        &self,
        question: &str,
        context: &SelectedContext<'_>,
    ) -> Result<Answer, AnswerError> {
        let question = question.trim();
        let source_chunks = context.indices();

        if question.is_empty() || context.is_empty() {
            return Ok(fallback(
                NOT_FOUND_MESSAGE,
                AnswerOutcome::NoRelevantContext,
                source_chunks,
            ));
        }

        let prompt = build_answer_prompt(question, context);
        let request = CompletionRequest {
            prompt,
            max_output_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
        };

        let raw = match self.model.complete(&request).await {
            Ok(raw) => raw,
            Err(ModelError::Refused(reason)) => {
                tracing::info!(%reason, "model refused to answer");
                return Ok(fallback(
                    NO_ANSWER_MESSAGE,
                    AnswerOutcome::Refused,
                    source_chunks,
                ));
            }
            Err(err) => return Err(err.into()),
        };

        let text = sanitize_model_output(&raw);
        if text.is_empty() {
            return Ok(fallback(
                NO_ANSWER_MESSAGE,
                AnswerOutcome::Empty,
                source_chunks,
            ));
        }
        if is_not_found_reply(&text) {
            return Ok(fallback(
                NOT_FOUND_MESSAGE,
                AnswerOutcome::NotFound,
                source_chunks,
            ));
        }

        let outcome = if context.matched {
            AnswerOutcome::Answered
        } else {
            AnswerOutcome::NoRelevantContext
        };

        Ok(Answer {
            text: truncate_answer(&text, self.config.max_answer_chars),
            grounded: context.matched,
            outcome,
            source_chunks,
        })
    }
}

fn fallback(text: &str, outcome: AnswerOutcome, source_chunks: Vec<usize>) -> Answer {
    Answer {
        text: text.to_string(),
        grounded: false,
        outcome,
        source_chunks,
    }
}

pub fn build_answer_prompt(question: &str, context: &SelectedContext<'_>) -> String {
    let mut blocks = String::new();
    for (n, chunk) in context.chunks.iter().enumerate() {
        let tag = format!("C{}", n + 1);
        blocks.push_str(&format!(
            "[{tag}] (chunk {}, chars {}-{})\n{}\n[/{tag}]\n\n",
            chunk.index, chunk.start, chunk.end, chunk.text
        ));
    }

    format!(
        "You answer questions about a single document.\n\
         Rules:\n\
         - Answer only from the context excerpts below. Do not use outside knowledge.\n\
         - If the excerpts do not contain the answer, reply exactly: {NOT_FOUND_MESSAGE}\n\
         - Be clear and concise. Never wrap your answer in code fences.\n\n\
         Context (excerpts in document order):\n\n\
         {blocks}\
         Question: {question}\n\n\
         Answer:"
    )
}

fn sanitize_model_output(answer: &str) -> String {
    static FENCE_RE: OnceLock<Regex> = OnceLock::new();
    static PREFIX_RE: OnceLock<Regex> = OnceLock::new();

    let mut text = answer.trim().to_string();
    if text.starts_with("```") {
        let re = FENCE_RE
            .get_or_init(|| Regex::new(r"(?s)^```[a-zA-Z]*\n?(.*?)\n?```$").expect("fence regex"));
        if let Some(body) = re.captures(&text).and_then(|caps| caps.get(1)) {
            text = body.as_str().trim().to_string();
        } else {
            text = text.trim_start_matches('`').trim().to_string();
        }
    }

    let re = PREFIX_RE.get_or_init(|| Regex::new(r"(?i)^answer\s*:\s*").expect("prefix regex"));
    re.replace(&text, "").trim().to_string()
}

fn is_not_found_reply(text: &str) -> bool {
    let normalize = |s: &str| {
        s.to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };
    let reply = normalize(text);
    let sentinel = normalize(NOT_FOUND_MESSAGE);
    reply == sentinel || (reply.starts_with(&sentinel) && reply.len() < sentinel.len() + 40)
}

/// Cuts at the last sentence end, or failing that the last space, that fits.
fn truncate_answer(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut: String = text.chars().take(max_chars).collect();
    let sentence_end = cut
        .rfind(['.', '!', '?'])
        .filter(|&pos| pos >= cut.len() / 2)
        .map(|pos| pos + 1);
    let end = sentence_end
        .or_else(|| cut.rfind(char::is_whitespace))
        .unwrap_or(cut.len());
    cut[..end].trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::models::Chunk;

    fn doc() -> Vec<Chunk> {
        vec![
            Chunk {
                index: 0,
                start: 0,
                end: 26,
                text: "The bridge opened in 1932.".to_string(),
            },
            Chunk {
                index: 1,
                start: 27,
                end: 52,
                text: "It spans the harbour arm.".to_string(),
            },
        ]
    }

    fn context(chunks: &[Chunk], matched: bool) -> SelectedContext<'_> {
        SelectedContext {
            chunks: chunks.iter().collect(),
            matched,
        }
    }

    fn engine(model: Arc<ScriptedModel>) -> AnswerEngine {
        AnswerEngine::new(model, AnswerConfig::default())
    }

    #[tokio::test]
    async fn grounded_answer_from_matched_context() {
        let model = Arc::new(ScriptedModel::replying("Answer: It opened in 1932."));
        let chunks = doc();
        let answer = engine(model.clone())
            .answer("When did the bridge open?", &context(&chunks, true))
            .await
            .unwrap();

        assert_eq!(answer.text, "It opened in 1932.");
        assert!(answer.grounded);
        assert_eq!(answer.outcome, AnswerOutcome::Answered);
        assert_eq!(answer.source_chunks, vec![0, 1]);

        let prompt = &model.prompts()[0];
        assert!(prompt.contains("[C1] (chunk 0, chars 0-26)"));
        assert!(prompt.contains(NOT_FOUND_MESSAGE));
        assert!(prompt.find("The bridge opened").unwrap() < prompt.find("harbour arm").unwrap());
        assert!(prompt.contains("Question: When did the bridge open?"));
    }

    #[tokio::test]
    async fn answer_without_lexical_match_is_not_grounded() {
        let model = Arc::new(ScriptedModel::replying("Probably in the thirties."));
        let chunks = doc();
        let answer = engine(model)
            .answer("Who designed it?", &context(&chunks, false))
            .await
            .unwrap();
        assert!(!answer.grounded);
        assert_eq!(answer.outcome, AnswerOutcome::NoRelevantContext);
    }

    #[tokio::test]
    async fn not_found_reply_is_flagged() {
        let model = Arc::new(ScriptedModel::replying(
            "I cannot find the answer in the provided text",
        ));
        let chunks = doc();
        let answer = engine(model)
            .answer("Who paid for it?", &context(&chunks, true))
            .await
            .unwrap();
        assert_eq!(answer.text, NOT_FOUND_MESSAGE);
        assert_eq!(answer.outcome, AnswerOutcome::NotFound);
        assert!(!answer.grounded);
    }

    #[tokio::test]
    async fn refusal_and_empty_output_use_fixed_fallback() {
        let chunks = doc();
        let refused = Arc::new(ScriptedModel::new(vec![Err(ModelError::Refused(
            "safety".to_string(),
        ))]));
        let answer = engine(refused)
            .answer("Question?", &context(&chunks, true))
            .await
            .unwrap();
        assert_eq!(answer.text, NO_ANSWER_MESSAGE);
        assert_eq!(answer.outcome, AnswerOutcome::Refused);
        assert!(!answer.grounded);

        let empty = Arc::new(ScriptedModel::replying("```\n```"));
        let answer = engine(empty)
            .answer("Question?", &context(&chunks, true))
            .await
            .unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::Empty);
        assert!(!answer.grounded);
    }

    #[tokio::test]
    async fn transient_failures_surface_as_errors() {
        let chunks = doc();
        let model = Arc::new(ScriptedModel::new(vec![Err(ModelError::Timeout(
            std::time::Duration::from_secs(1),
        ))]));
        let err = engine(model)
            .answer("When?", &context(&chunks, true))
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerError::ModelUnavailable(_)));

        let model = Arc::new(ScriptedModel::new(vec![Err(ModelError::Throttled)]));
        let err = engine(model)
            .answer("When?", &context(&chunks, true))
            .await
            .unwrap_err();
        assert_eq!(err, AnswerError::Throttled);
    }

    #[tokio::test]
    async fn empty_question_skips_the_model() {
        let model = Arc::new(ScriptedModel::replying("unused"));
        let chunks = doc();
        let answer = engine(model.clone())
            .answer("   ", &context(&chunks, false))
            .await
            .unwrap();
        assert_eq!(model.calls(), 0);
        assert!(!answer.grounded);
    }

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(sanitize_model_output("```markdown\nHello\n```"), "Hello");
        assert_eq!(sanitize_model_output("answer:  Hi"), "Hi");
    }

    #[test]
    fn truncation_prefers_sentence_boundaries() {
        let text = "First sentence here. Second sentence is longer and gets cut.";
        assert_eq!(truncate_answer(text, 30), "First sentence here.");
        assert_eq!(truncate_answer("one two three", 9), "one two");
        assert_eq!(truncate_answer("short", 9), "short");
    }
}
