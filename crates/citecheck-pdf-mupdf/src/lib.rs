use std::path::Path;

use mupdf::{Document, Page, TextPageFlags};

use citecheck_core::{BackendError, PageText, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate isolates the AGPL-3.0 mupdf dependency so that the rest of
/// the workspace does not depend on it transitively.
///
/// Text in the bottom 5% (footers) and top 4% (headers) of each page is
/// excluded by default, so running heads and page numbers do not end up in
/// the middle of a reference that spans a page break.
#[derive(Debug, Clone, Copy)]
pub struct MupdfBackend {
    /// Fraction of page height from the bottom to drop. `None` keeps footers.
    footer_exclusion_ratio: Option<f32>,
    /// Fraction of page height from the top to drop. `None` keeps headers.
    header_exclusion_ratio: Option<f32>,
}

impl Default for MupdfBackend {
    fn default() -> Self {
        Self {
            footer_exclusion_ratio: Some(0.05),
            header_exclusion_ratio: Some(0.04),
        }
    }
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the footer exclusion ratio. Pass `0.0` to disable.
    pub fn with_footer_exclusion(mut self, ratio: f32) -> Self {
        self.footer_exclusion_ratio = (ratio > 0.0).then_some(ratio);
        self
    }

    /// Set the header exclusion ratio. Pass `0.0` to disable.
    pub fn with_header_exclusion(mut self, ratio: f32) -> Self {
        self.header_exclusion_ratio = (ratio > 0.0).then_some(ratio);
        self
    }

    /// Text of one page, line by line, without header and footer blocks.
    fn page_text(&self, page: &Page) -> Result<String, BackendError> {
        let extraction = |e: mupdf::Error| BackendError::Extraction(e.to_string());

        let text_page = page.to_text_page(TextPageFlags::empty()).map_err(extraction)?;
        let bounds = page.bounds().map_err(extraction)?;
        let height = bounds.y1 - bounds.y0;
        let header_limit = self.header_exclusion_ratio.map(|r| bounds.y0 + height * r);
        let footer_limit = self.footer_exclusion_ratio.map(|r| bounds.y1 - height * r);

        let mut text = String::new();
        for block in text_page.blocks() {
            let block_bounds = block.bounds();
            if header_limit.is_some_and(|limit| block_bounds.y1 <= limit) {
                continue;
            }
            if footer_limit.is_some_and(|limit| block_bounds.y0 >= limit) {
                continue;
            }
            for line in block.lines() {
                text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                text.push('\n');
            }
        }
        Ok(expand_ligatures(&text))
    }
}

/// Expand typographic ligatures that PDF fonts emit as single code points.
fn expand_ligatures(text: &str) -> String {
    text.replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace(['\u{FB05}', '\u{FB06}'], "st")
}

impl PdfBackend for MupdfBackend {
    fn extract_page_texts(&self, path: &Path) -> Result<PageText, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::Open("invalid path encoding".into()))?;
        let document = Document::open(path_str).map_err(|e| BackendError::Open(e.to_string()))?;

        let mut pages = Vec::new();
        for page in document
            .pages()
            .map_err(|e| BackendError::Extraction(e.to_string()))?
        {
            let page = page.map_err(|e| BackendError::Extraction(e.to_string()))?;
            pages.push(self.page_text(&page)?);
        }
        tracing::debug!(path = %path.display(), pages = pages.len(), "pdf text extracted");
        Ok(PageText::new(pages))
    }
}
