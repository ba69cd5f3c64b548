use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded slice of a document's text. Offsets count Unicode scalar values
/// and `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub original_filename: Option<String>,
    pub content_hash: String,
    pub page_count: usize,
    pub text: String,
    pub chunks: Vec<Chunk>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    Answered,
    NoRelevantContext,
    NotFound,
    Refused,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub grounded: bool,
    pub outcome: AnswerOutcome,
    pub source_chunks: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedQuestionSet {
    pub document_id: String,
    pub questions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}
