use thiserror::Error;

use crate::models::Chunk;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("max_chunk_chars ({max}) must be greater than overlap_chars ({overlap})")]
    OverlapTooLarge { max: usize, overlap: usize },
}

/// Sizes are counted in characters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    pub max_chunk_chars: usize,
    pub overlap_chars: usize,
    /// How far to look back for whitespace before splitting inside a word.
    pub boundary_window: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 1_000,
            overlap_chars: 200,
            boundary_window: 80,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.max_chunk_chars == 0 || self.max_chunk_chars <= self.overlap_chars {
            return Err(ChunkingError::OverlapTooLarge {
                max: self.max_chunk_chars,
                overlap: self.overlap_chars,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ChunkManager {
    config: ChunkConfig,
}

impl ChunkManager {
    /// Rejects a configuration that could never make progress.
    pub fn new(config: ChunkConfig) -> Result<Self, ChunkingError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Splits `text` into ordered chunks that together cover every character.
    /// Consecutive chunks share roughly `overlap_chars` characters, snapped to
    /// word starts when one is within the boundary window.
    pub fn chunk(&self, text: &str) -> Result<Vec<Chunk>, ChunkingError> {
        let chars: Vec<char> = text.chars().collect();
        let offsets = byte_offsets(text);
        let total = chars.len();

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < total {
            let end = boundary_end(
                &chars,
                start,
                self.config.max_chunk_chars,
                self.config.boundary_window,
            );
            chunks.push(Chunk {
                index: chunks.len(),
                start,
                end,
                text: text[offsets[start]..offsets[end]].to_string(),
            });

            if end == total {
                break;
            }
            start = self.next_start(&chars, start, end);
        }

        Ok(chunks)
    }

    /// Longest prefix of `text` no longer than `max_chars`, cut with the same
    /// boundary rule used between chunks.
    pub fn leading_text<'a>(&self, text: &'a str, max_chars: usize) -> &'a str {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= max_chars {
            return text;
        }
        if max_chars == 0 {
            return "";
        }

        let end = boundary_end(&chars, 0, max_chars, self.config.boundary_window);
        let offsets = byte_offsets(text);
        &text[..offsets[end]]
    }

    fn next_start(&self, chars: &[char], start: usize, end: usize) -> usize {
        let floor = start + 1;
        let nominal = end.saturating_sub(self.config.overlap_chars).max(floor);
        if nominal >= end {
            return end;
        }
        if is_word_start(chars, nominal) {
            return nominal;
        }

        let lower = nominal
            .saturating_sub(self.config.boundary_window)
            .max(floor);
        let backward = (lower..nominal).rev().find(|&p| is_word_start(chars, p));
        let forward = (nominal..end).find(|&p| is_word_start(chars, p));

        // Inside whitespace the next word is the natural start; inside a word,
        // back up to where it begins.
        let preferred = if chars[nominal].is_whitespace() {
            forward.or(backward)
        } else {
            backward.or(forward)
        };
        preferred.unwrap_or(nominal)
    }
}

/// Rebuilds the original text from its chunks by dropping each chunk's
/// overlap with what has already been emitted.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered: usize = 0;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start);
        out.extend(chunk.text.chars().skip(skip));
        covered = covered.max(chunk.end);
    }
    out
}

fn boundary_end(chars: &[char], start: usize, max_chars: usize, window: usize) -> usize {
    let limit = (start + max_chars).min(chars.len());
    if limit == chars.len() {
        return limit;
    }

    let splits_word = !chars[limit - 1].is_whitespace() && !chars[limit].is_whitespace();
    let mut end = if splits_word {
        let lower = limit.saturating_sub(window).max(start + 1);
        match (lower..limit).rev().find(|&p| chars[p].is_whitespace()) {
            Some(space) => space,
            None => return limit,
        }
    } else {
        limit
    };

    while end > start + 1 && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    end
}

fn is_word_start(chars: &[char], pos: usize) -> bool {
    !chars[pos].is_whitespace() && (pos == 0 || chars[pos - 1].is_whitespace())
}

fn byte_offsets(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect()
}
