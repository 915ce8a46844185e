//! Raw bytes -> plain text.
//!
//! Content columns and files go through a [`TextExtractor`] before they are
//! indexed. [`HtmlTextExtractor`] decodes UTF-8 and strips HTML and is the
//! default; [`PdfTextExtractor`] reads the text layer of PDF documents. Other
//! formats plug in by implementing the trait.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::search::canonicalize::html_to_text;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("content is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("not a PDF document")]
    NotPdf,

    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("{0}")]
    Other(String),
}

pub trait TextExtractor: Send + Sync {
    fn to_plain_text(&self, raw: &[u8]) -> Result<String, ExtractError>;
}

/// UTF-8 text with optional HTML markup.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlTextExtractor;

impl TextExtractor for HtmlTextExtractor {
    fn to_plain_text(&self, raw: &[u8]) -> Result<String, ExtractError> {
        let text = std::str::from_utf8(raw)?;
        Ok(html_to_text(text).nfc().collect())
    }
}

/// Text layer of a PDF document, whitespace collapsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

const PDF_MAGIC: &[u8] = b"%PDF-";

impl TextExtractor for PdfTextExtractor {
    fn to_plain_text(&self, raw: &[u8]) -> Result<String, ExtractError> {
        if !raw.starts_with(PDF_MAGIC) {
            return Err(ExtractError::NotPdf);
        }
        let text = pdf_extract::extract_text_from_mem(raw)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(text.nfc().collect())
    }
}
