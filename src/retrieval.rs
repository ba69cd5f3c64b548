use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::models::Chunk;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    /// Rank chunks by lexical overlap with the question.
    Lexical,
    /// Send the document from the top, as much as fits the budget.
    Leading,
}

#[derive(Clone, Debug)]
pub struct SelectionConfig {
    pub max_chunks: usize,
    pub max_context_chars: usize,
    pub mode: SelectionMode,
    pub weight_by_rarity: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_chunks: 6,
            max_context_chars: 8_000,
            mode: SelectionMode::Lexical,
            weight_by_rarity: true,
        }
    }
}

/// Chunks chosen for one question, in document order.
#[derive(Debug, Clone)]
pub struct SelectedContext<'a> {
    pub chunks: Vec<&'a Chunk>,
    /// Whether any selected chunk shares a term with the question.
    pub matched: bool,
}

impl SelectedContext<'_> {
    pub fn indices(&self) -> Vec<usize> {
        self.chunks.iter().map(|chunk| chunk.index).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ContextSelector {
    config: SelectionConfig,
}

impl ContextSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    pub fn select<'a>(&self, question: &str, chunks: &'a [Chunk]) -> SelectedContext<'a> {
        if chunks.is_empty() {
            return SelectedContext {
                chunks: vec![],
                matched: false,
            };
        }

        let terms = question_terms(question);
        let scores = score_chunks(&terms, chunks, self.config.weight_by_rarity);

        let (order, matched) = match self.config.mode {
            SelectionMode::Leading => {
                let order: Vec<usize> = (0..chunks.len()).collect();
                let picked = self.take_within_budget(&order, chunks);
                let matched = picked.iter().any(|&i| scores[i] > 0.0);
                (picked, matched)
            }
            SelectionMode::Lexical => {
                let mut ranked: Vec<usize> =
                    (0..chunks.len()).filter(|&i| scores[i] > 0.0).collect();
                if ranked.is_empty() {
                    tracing::debug!(
                        terms = terms.len(),
                        "no lexical overlap; falling back to leading chunks"
                    );
                    let order: Vec<usize> = (0..chunks.len()).collect();
                    (self.take_within_budget(&order, chunks), false)
                } else {
                    ranked.sort_by(|&a, &b| {
                        scores[b]
                            .partial_cmp(&scores[a])
                            .unwrap_or(Ordering::Equal)
                            .then(a.cmp(&b))
                    });
                    (self.take_within_budget(&ranked, chunks), true)
                }
            }
        };

        let mut order = order;
        order.sort_unstable();

        tracing::debug!(
            selected = order.len(),
            total = chunks.len(),
            matched,
            "selected context"
        );

        SelectedContext {
            chunks: order.into_iter().map(|i| &chunks[i]).collect(),
            matched,
        }
    }

    /// Takes candidates in the given order while both budgets hold. The first
    /// candidate is always taken so the model never sees an empty context.
    fn take_within_budget(&self, candidates: &[usize], chunks: &[Chunk]) -> Vec<usize> {
        let max_chunks = self.config.max_chunks.max(1);
        let mut picked = Vec::new();
        let mut used_chars = 0usize;

        for &index in candidates {
            if picked.len() >= max_chunks {
                break;
            }
            let size = chunks[index].char_len();
            if !picked.is_empty() && used_chars + size > self.config.max_context_chars {
                continue;
            }
            used_chars += size;
            picked.push(index);
        }

        picked
    }
}

fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(r"\w+").expect("static token regex"))
}

fn stopwords() -> &'static HashSet<&'static str> {
    static STOPWORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    STOPWORDS.get_or_init(|| {
        [
            "what", "when", "where", "which", "who", "whom", "whose", "why", "how", "does",
            "did", "was", "were", "are", "the", "and", "for", "with", "about", "from", "into",
            "this", "that", "these", "those", "there", "their", "they", "them", "its", "can",
            "could", "would", "should", "will", "have", "has", "had", "been", "being", "not",
            "any", "all", "some", "tell", "explain", "describe", "document", "text", "pdf",
        ]
        .into_iter()
        .collect()
    })
}

/// Distinct lowercase question terms, in first-seen order.
pub fn question_terms(question: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in token_regex().find_iter(question) {
        let token = m.as_str().to_lowercase();
        if token.chars().count() < 3 || stopwords().contains(token.as_str()) {
            continue;
        }
        if seen.insert(token.clone()) {
            out.push(token);
        }
    }
    out
}

fn chunk_terms(text: &str) -> HashSet<String> {
    token_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn score_chunks(terms: &[String], chunks: &[Chunk], weight_by_rarity: bool) -> Vec<f32> {
    if terms.is_empty() {
        return vec![0.0; chunks.len()];
    }

    let term_sets: Vec<HashSet<String>> = chunks.iter().map(|c| chunk_terms(&c.text)).collect();

    let total = chunks.len() as f32;
    let mut weights: HashMap<&str, f32> = HashMap::new();
    for term in terms {
        let weight = if weight_by_rarity {
            let df = term_sets.iter().filter(|set| set.contains(term)).count() as f32;
            ((total + 1.0) / (df + 0.5)).ln()
        } else {
            1.0
        };
        weights.insert(term.as_str(), weight);
    }

    term_sets
        .iter()
        .map(|set| {
            terms
                .iter()
                .filter(|term| set.contains(term.as_str()))
                .map(|term| weights.get(term.as_str()).copied().unwrap_or(0.0))
                .sum::<f32>()
        })
        .collect()
}
