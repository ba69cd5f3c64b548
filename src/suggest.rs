use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use thiserror::Error;

use crate::config::SuggestionConfig;
use crate::ingest::chunker::ChunkManager;
use crate::llm::{CompletionRequest, LanguageModel, ModelError};
use crate::models::SuggestedQuestionSet;

/// Both variants are soft: the document stays usable without suggestions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SuggestionError {
    #[error("suggestion model call failed: {0}")]
    Model(#[from] ModelError),
    #[error("model returned no usable questions")]
    NoUsableQuestions,
    #[error("document {0} is not registered")]
    UnknownDocument(String),
}

#[derive(Clone)]
pub struct SuggestionEngine {
    model: Arc<dyn LanguageModel>,
    config: SuggestionConfig,
    chunker: ChunkManager,
}

impl SuggestionEngine {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        config: SuggestionConfig,
        chunker: ChunkManager,
    ) -> Self {
        Self {
            model,
            config,
            chunker,
        }
    }

    pub async fn suggest(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<SuggestedQuestionSet, SuggestionError> {
        let source = self
            .chunker
            .leading_text(text, self.config.max_source_chars);
        let prompt = build_suggestion_prompt(source, self.config.count);

        let raw = self
            .model
            .complete(&CompletionRequest {
                prompt,
                max_output_tokens: self.config.max_output_tokens,
                temperature: self.config.temperature,
            })
            .await?;

        let questions = filter_questions(
            parse_questions(&raw),
            self.config.count,
            self.config.max_question_chars,
        );
        if questions.is_empty() {
            tracing::warn!(document_id, "suggestion reply had no usable questions");
            return Err(SuggestionError::NoUsableQuestions);
        }

        tracing::info!(document_id, count = questions.len(), "generated suggestions");
        Ok(SuggestedQuestionSet {
            document_id: document_id.to_string(),
            questions,
            generated_at: Utc::now(),
        })
    }
}

fn build_suggestion_prompt(text: &str, count: usize) -> String {
    let upper = count + 2;
    format!(
        "Analyze the following document text and write {count} to {upper} relevant questions \
         a reader could ask about it.\n\
         The questions must:\n\
         1. Be answerable strictly from the document text\n\
         2. Be clear and specific\n\
         3. Mix simple factual questions with more analytical ones\n\
         4. Each cover a different point of the document\n\n\
         Document text:\n{text}\n\n\
         Output only the questions, one per line, with no numbering or other text."
    )
}

/// Accepts either a JSON array of strings or one question per line, with
/// list markers and wrapping quotes removed.
pub fn parse_questions(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return items.iter().map(|item| clean_line(item)).collect();
        }
    }

    trimmed
        .lines()
        .map(clean_line)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .collect()
}

fn clean_line(line: &str) -> String {
    static MARKER_RE: OnceLock<Regex> = OnceLock::new();
    let re = MARKER_RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:[-*\u{2022}]+|\d+[.)]|\(\d+\)|q\d+\s*[:.)]|question\s*\d*\s*:)\s*")
            .expect("marker regex")
    });

    let line = line.trim();
    let line = match re.find(line) {
        Some(marker) => &line[marker.end()..],
        None => line,
    };
    line.trim()
        .trim_matches(|c| matches!(c, '"' | '\u{201C}' | '\u{201D}'))
        .trim()
        .to_string()
}

/// Drops empty, overlong and near-duplicate questions, keeping the first
/// occurrence, and caps the result at `count`.
pub fn filter_questions(
    candidates: Vec<String>,
    count: usize,
    max_chars: usize,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for question in candidates {
        if out.len() >= count {
            break;
        }
        let question = question.trim();
        if question.is_empty() || question.chars().count() > max_chars {
            continue;
        }
        let key = normalized_key(question);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        out.push(question.to_string());
    }
    out
}

fn normalized_key(question: &str) -> String {
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
