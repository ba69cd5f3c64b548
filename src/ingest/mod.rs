pub mod chunker;
pub mod pdf;

use chrono::Utc;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Document;
use chunker::{ChunkConfig, ChunkManager, ChunkingError};
use pdf::ExtractionError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
}

#[derive(Clone)]
pub struct Ingestor {
    chunker: ChunkManager,
}

impl Ingestor {
    /// Fails fast on a chunk configuration that could never produce chunks.
    pub fn new(config: ChunkConfig) -> Result<Self, ChunkingError> {
        Ok(Self {
            chunker: ChunkManager::new(config)?,
        })
    }

    pub fn chunker(&self) -> &ChunkManager {
        &self.chunker
    }

    /// Extracts and chunks a PDF. The returned document is complete; callers
    /// may expose it for questions as soon as this returns.
    pub async fn ingest(
        &self,
        pdf_bytes: Vec<u8>,
        original_filename: Option<String>,
    ) -> Result<Document, IngestError> {
        let content_hash = content_sha256(&pdf_bytes);
        let byte_len = pdf_bytes.len();

        let extracted = tokio::task::spawn_blocking(move || pdf::extract_text(&pdf_bytes))
            .await
            .map_err(|err| {
                ExtractionError::Unreadable(format!("PDF extraction task failed: {err}"))
            })??;

        let chunks = self.chunker.chunk(&extracted.text)?;

        tracing::info!(
            bytes = byte_len,
            pages = extracted.page_count,
            chars = extracted.text.chars().count(),
            chunks = chunks.len(),
            "ingested PDF"
        );

        Ok(Document {
            id: Uuid::new_v4().to_string(),
            original_filename,
            content_hash,
            page_count: extracted.page_count,
            text: extracted.text,
            chunks,
            ingested_at: Utc::now(),
        })
    }
}

pub fn content_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::chunker::reassemble;
    use super::pdf::fixtures::build_pdf;
    use super::*;

    #[test]
    fn rejects_invalid_chunk_config_up_front() {
        let err = Ingestor::new(ChunkConfig {
            max_chunk_chars: 100,
            overlap_chars: 150,
            boundary_window: 10,
        })
        .err()
        .unwrap();
        assert!(matches!(err, ChunkingError::OverlapTooLarge { .. }));
    }

    #[tokio::test]
    async fn non_pdf_bytes_fail_extraction() {
        let ingestor = Ingestor::new(ChunkConfig::default()).unwrap();
        let err = ingestor
            .ingest(b"hello world".to_vec(), Some("notes.txt".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Extraction(ExtractionError::NotPdf(_))
        ));
    }

    #[tokio::test]
    async fn multi_page_pdf_becomes_reconstructable_chunks() {
        let ingestor = Ingestor::new(ChunkConfig {
            max_chunk_chars: 40,
            overlap_chars: 10,
            boundary_window: 10,
        })
        .unwrap();
        let bytes = build_pdf(&[
            "The orchard has two hundred apple trees planted in rows.",
            "Harvest starts in late September and lasts three weeks.",
            "Pickers are paid by the crate rather than by the hour.",
        ]);

        let doc = ingestor
            .ingest(bytes.clone(), Some("orchard.pdf".to_string()))
            .await
            .unwrap();

        assert_eq!(doc.page_count, 3);
        assert_eq!(doc.content_hash, content_sha256(&bytes));
        assert_eq!(doc.original_filename.as_deref(), Some("orchard.pdf"));
        assert!(doc.text.contains("September"));
        assert!(doc.chunks.len() > 1);
        assert!(doc.chunks.iter().all(|c| c.char_len() <= 40));
        assert_eq!(reassemble(&doc.chunks), doc.text);
    }

    #[test]
    fn content_hash_is_stable_hex() {
        let hash = content_sha256(b"abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
