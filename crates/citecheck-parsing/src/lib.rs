use std::path::Path;

use thiserror::Error;

pub mod authors;
pub mod citation;
pub mod config;
pub mod extractor;
pub mod section;
pub mod title;
pub mod year;

pub use citation::parse_citation;
pub use config::{ListOverride, ParsingConfig, ParsingConfigBuilder};
pub use extractor::CitationExtractor;
pub use section::{DocumentText, SegmentationStrategy, StrategyOutcome};
// Re-export domain types from core (canonical definitions live there)
pub use citecheck_core::{BackendError, PageText, ParsedCitation, PdfBackend, RawReferenceEntry};

#[derive(Error, Debug)]
pub enum ParsingError {
    #[error("no reference entries found")]
    NoEntries,
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Extract citations from a document using the given backend for text extraction.
///
/// Pipeline:
/// 1. Extract per-page text via `backend`
/// 2. Locate the bibliography (last header, or the trailing fallback share)
/// 3. Segment it into raw entries
/// 4. Parse authors, title and year from each entry
pub fn extract_citations(
    path: &Path,
    backend: &dyn PdfBackend,
) -> Result<Vec<ParsedCitation>, ParsingError> {
    CitationExtractor::new().extract_from_path(path, backend)
}
