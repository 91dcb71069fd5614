use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open document: {0}")]
    Open(String),
    #[error("failed to extract text: {0}")]
    Extraction(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extracted text of a document, one string per page, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pages: Vec<String>,
}

impl PageText {
    pub fn new(pages: Vec<String>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl From<Vec<String>> for PageText {
    fn from(pages: Vec<String>) -> Self {
        Self::new(pages)
    }
}

impl<'a> From<Vec<&'a str>> for PageText {
    fn from(pages: Vec<&'a str>) -> Self {
        Self::new(pages.into_iter().map(String::from).collect())
    }
}

/// Trait for document text extraction backends.
///
/// Implementors provide the low-level per-page text extraction step; the
/// parsing pipeline (section detection, segmentation, field extraction)
/// lives in `citecheck_parsing::CitationExtractor`.
pub trait PdfBackend: Send + Sync {
    /// Extract the text of every page. Failure is fatal for the document.
    fn extract_page_texts(&self, path: &Path) -> Result<PageText, BackendError>;
}

/// Backend for already-extracted plain text (e.g. `pdftotext` output).
///
/// Pages are separated by form feeds; a file without any is a single page.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFileBackend;

impl PdfBackend for TextFileBackend {
    fn extract_page_texts(&self, path: &Path) -> Result<PageText, BackendError> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| BackendError::Extraction(format!("{} is not UTF-8: {}", path.display(), e)))?;
        let pages = text
            .split('\u{0C}')
            .map(String::from)
            .collect::<Vec<_>>();
        Ok(PageText::new(pages))
    }
}
