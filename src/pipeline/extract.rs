//! PDF text extraction.

use std::io;
use std::path::Path;

use thiserror::Error;

/// Errors raised while pulling text out of an uploaded PDF.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Source file could not be read from disk.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path of the unreadable file.
        path: String,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// The PDF parser rejected the file.
    #[error("Failed to extract text: {0}")]
    Pdf(String),
    /// Parsing succeeded but yielded no usable text (scanned or image-only PDF).
    #[error("Document contains no extractable text")]
    Empty,
}

/// Extract the full text of a PDF file.
///
/// Blocking; callers on the async runtime should wrap this in `spawn_blocking`.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let text =
        pdf_extract::extract_text_from_mem(&bytes).map_err(|err| ExtractError::Pdf(err.to_string()))?;

    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}
