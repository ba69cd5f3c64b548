use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

/// Inserted between pages so chunking never glues the last sentence of one
/// page onto the first sentence of the next.
pub const PAGE_SEPARATOR: &str = "\n\n";

const HEADER_SCAN_BYTES: usize = 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("input is not a PDF: {0}")]
    NotPdf(String),
    #[error("PDF is encrypted and no password was supplied")]
    Encrypted,
    #[error("PDF could not be read: {0}")]
    Unreadable(String),
    #[error("PDF contains no extractable text")]
    NoText,
}

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

pub fn extract_text(bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
    if !has_pdf_header(bytes) {
        return Err(ExtractionError::NotPdf("missing %PDF header".to_string()));
    }

    let document = lopdf::Document::load_mem(bytes).map_err(|err| {
        let message = err.to_string();
        if is_encryption_message(&message) {
            ExtractionError::Encrypted
        } else {
            ExtractionError::NotPdf(message)
        }
    })?;
    if document.is_encrypted() {
        return Err(ExtractionError::Encrypted);
    }
    let page_count = document.get_pages().len();
    drop(document);

    // pdf-extract panics on some malformed content streams.
    let pages = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));

    let pages = match pages {
        Ok(Ok(pages)) => pages,
        Ok(Err(err)) => {
            let message = err.to_string();
            if is_encryption_message(&message) {
                return Err(ExtractionError::Encrypted);
            }
            return Err(ExtractionError::Unreadable(message));
        }
        Err(_) => {
            return Err(ExtractionError::Unreadable(
                "PDF parser panicked".to_string(),
            ));
        }
    };

    let text = join_pages(pages.iter().map(String::as_str));
    if text.is_empty() {
        return Err(ExtractionError::NoText);
    }

    tracing::debug!(
        pages = page_count,
        chars = text.chars().count(),
        "extracted PDF text"
    );

    Ok(ExtractedText {
        text,
        page_count: page_count.max(pages.len()),
    })
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SCAN_BYTES)];
    window.windows(5).any(|w| w == b"%PDF-")
}

fn is_encryption_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("encrypt") || lower.contains("decrypt") || lower.contains("password")
}

/// Normalizes each page and joins the non-empty ones in reading order.
pub fn join_pages<'a>(pages: impl IntoIterator<Item = &'a str>) -> String {
    pages
        .into_iter()
        .map(normalize_page)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

fn normalize_page(input: &str) -> String {
    let cleaned = input
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{00A0}', " ")
        .replace('\u{000C}', "\n");

    let mut lines: Vec<String> = Vec::new();
    for line in cleaned.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().map_or(true, |prev| prev.is_empty()) {
            continue;
        }
        lines.push(line);
    }

    lines.join("\n").trim().to_string()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream, StringFormat};

    /// One Courier text line per page; an empty string makes a blank page.
    pub(crate) fn build_pdf(pages: &[&str]) -> Vec<u8> {
        save(&mut document(pages))
    }

    /// Same layout with a standard security handler in the trailer.
    pub(crate) fn build_encrypted_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = document(pages);
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "O" => Object::String(vec![0x41; 32], StringFormat::Hexadecimal),
            "U" => Object::String(vec![0x42; 32], StringFormat::Hexadecimal),
            "P" => -4,
        });
        doc.trailer.set("Encrypt", encrypt_id);
        doc.trailer.set(
            "ID",
            vec![
                Object::String(vec![0x11; 16], StringFormat::Hexadecimal),
                Object::String(vec![0x11; 16], StringFormat::Hexadecimal),
            ],
        );
        save(&mut doc)
    }

    fn save(doc: &mut Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn document(pages: &[&str]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let operations = if text.is_empty() {
                vec![]
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }
}
