use std::path::Path;

use citecheck_core::{PageText, ParsedCitation, PdfBackend, RawReferenceEntry};

use crate::ParsingError;
use crate::citation::parse_citation;
use crate::config::ParsingConfig;
use crate::section::{self, DocumentText, SegmentationStrategy};

/// A configurable citation extraction pipeline.
///
/// Holds a [`ParsingConfig`] and exposes each pipeline step as a method.
/// The default constructor uses built-in defaults; use
/// [`CitationExtractor::with_config`] to supply custom headers and limits.
#[derive(Debug, Clone, Default)]
pub struct CitationExtractor {
    config: ParsingConfig,
}

impl CitationExtractor {
    /// Create an extractor with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor with a custom configuration.
    pub fn with_config(config: ParsingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParsingConfig {
        &self.config
    }

    /// Locate the bibliography and cut it into raw entries.
    pub fn segment(&self, pages: &PageText) -> Vec<RawReferenceEntry> {
        section::segment(&DocumentText::from_pages(pages), &self.config)
    }

    /// Like [`segment`](Self::segment), also reporting which strategy won.
    pub fn segment_with_strategy(
        &self,
        pages: &PageText,
    ) -> Option<(SegmentationStrategy, Vec<RawReferenceEntry>)> {
        section::segment_with_strategy(&DocumentText::from_pages(pages), &self.config)
    }

    /// Parse one raw entry. Never fails.
    pub fn parse(&self, entry: &RawReferenceEntry) -> ParsedCitation {
        parse_citation(&entry.text, &self.config)
    }

    /// Segment and parse already-extracted page text.
    ///
    /// Zero entries is an error: the document has no recognizable bibliography.
    pub fn extract_from_pages(&self, pages: &PageText) -> Result<Vec<ParsedCitation>, ParsingError> {
        let entries = self.segment(pages);
        if entries.is_empty() {
            return Err(ParsingError::NoEntries);
        }
        let citations: Vec<ParsedCitation> = entries.iter().map(|e| self.parse(e)).collect();
        tracing::info!(
            entries = citations.len(),
            low_confidence = citations.iter().filter(|c| c.low_confidence).count(),
            "citations parsed"
        );
        Ok(citations)
    }

    /// Extract page text with `backend`, then segment and parse it.
    pub fn extract_from_path(
        &self,
        path: &Path,
        backend: &dyn PdfBackend,
    ) -> Result<Vec<ParsedCitation>, ParsingError> {
        let pages = backend.extract_page_texts(path)?;
        tracing::debug!(path = %path.display(), pages = pages.len(), "page text extracted");
        self.extract_from_pages(&pages)
    }
}
