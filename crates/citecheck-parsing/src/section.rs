use once_cell::sync::Lazy;
use regex::Regex;

use citecheck_core::normalize::normalize_text;
use citecheck_core::{PageText, RawReferenceEntry};

use crate::config::ParsingConfig;

/// Concatenated document text with the byte offset where each page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentText {
    text: String,
    page_starts: Vec<usize>,
}

impl DocumentText {
    /// Join pages with `\n`, recording page start offsets.
    pub fn from_pages(pages: &PageText) -> Self {
        let mut text = String::new();
        let mut page_starts = Vec::with_capacity(pages.len());
        for (i, page) in pages.pages().iter().enumerate() {
            if i > 0 {
                text.push('\n');
            }
            page_starts.push(text.len());
            text.push_str(page);
        }
        Self { text, page_starts }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 1-based page containing `offset`.
    pub fn page_at(&self, offset: usize) -> usize {
        self.page_starts.partition_point(|&start| start <= offset).max(1)
    }
}

/// Segmentation strategy identifier, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationStrategy {
    /// `[n]` or `n.` at the start of a line.
    Marker,
    /// `Surname, X` at the start of a line that does not continue the previous one.
    AuthorFirst,
    /// Blank-line separated paragraphs.
    Paragraph,
}

/// A piece of the reference region, with its offset inside the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub offset: usize,
    pub text: &'a str,
}

/// What a strategy made of the reference region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome<'a> {
    Split(Vec<Chunk<'a>>),
    NoMatch,
}

pub type Strategy = for<'a> fn(&'a str, &ParsingConfig) -> StrategyOutcome<'a>;

/// Strategies in priority order.
pub const STRATEGIES: [(SegmentationStrategy, Strategy); 3] = [
    (SegmentationStrategy::Marker, split_on_markers),
    (SegmentationStrategy::AuthorFirst, split_on_author_lines),
    (SegmentationStrategy::Paragraph, split_on_blank_lines),
];

/// Byte range of the bibliography inside the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceRegion {
    pub start: usize,
    pub end: usize,
    /// False when the region is the trailing fallback share of the text.
    pub header_found: bool,
}

/// Lines with their byte offsets, without the trailing newline.
fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_inclusive('\n').scan(0, |pos, line| {
        let start = *pos;
        *pos += line.len();
        Some((start, line.trim_end_matches(['\n', '\r'])))
    })
}

/// Normalized heading text with a leading section number removed
/// (`7 References`, `VII. REFERENCES`, `A.2 Appendix`).
fn heading_text(line: &str) -> String {
    static NUMBERING_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^\s*(?:\d+(?:\.\d+)*\.?|[IVXLC]+\.|[A-Z](?:\.\d+)*\.?)\s+").unwrap()
    });
    normalize_text(&NUMBERING_RE.replace(line, ""))
}

fn is_end_heading(line: &str, config: &ParsingConfig) -> bool {
    static FLOAT_CAPTION_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)^\s*(?:algorithm|figure|table)\s+\d+").unwrap());
    if FLOAT_CAPTION_RE.is_match(line) {
        return true;
    }
    let heading = heading_text(line);
    config.end_headings.iter().any(|h| {
        heading == *h
            || heading
                .strip_prefix(h.as_str())
                .and_then(|rest| rest.strip_prefix(' '))
                .is_some_and(|label| !label.is_empty() && !label.contains(' '))
    })
}

/// Locate the bibliography.
///
/// The last line matching a configured header opens the region, which ends
/// at the next end heading. Without a usable header the final
/// `fallback_fraction` of the text, moved forward to a line start, is used.
pub fn find_reference_region(text: &str, config: &ParsingConfig) -> ReferenceRegion {
    let header_end = lines_with_offsets(text)
        .filter(|(_, line)| {
            let heading = heading_text(line);
            config.section_headers.iter().any(|h| heading == *h)
        })
        .last()
        .map(|(offset, line)| {
            let end = offset + line.len();
            if text[end..].starts_with("\r\n") {
                end + 2
            } else if text[end..].starts_with('\n') {
                end + 1
            } else {
                end
            }
        });

    if let Some(start) = header_end {
        let end = lines_with_offsets(&text[start..])
            .find(|(_, line)| is_end_heading(line, config))
            .map_or(text.len(), |(offset, _)| start + offset);
        if !text[start..end].trim().is_empty() {
            return ReferenceRegion {
                start,
                end,
                header_found: true,
            };
        }
        tracing::debug!("reference header found but section is empty, using fallback");
    }

    let cutoff = (text.len() as f64 * (1.0 - config.fallback_fraction)) as usize;
    let cutoff = cutoff.min(text.len());
    let start = if cutoff == 0 || text.as_bytes()[cutoff - 1] == b'\n' {
        cutoff
    } else {
        text.as_bytes()[cutoff..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(text.len(), |p| cutoff + p + 1)
    };
    ReferenceRegion {
        start,
        end: text.len(),
        header_found: false,
    }
}

/// Split before every line that starts with a given pattern.
fn split_before_lines<'a>(region: &'a str, starts: &[usize]) -> StrategyOutcome<'a> {
    if starts.is_empty() {
        return StrategyOutcome::NoMatch;
    }
    let chunks = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(region.len());
            Chunk {
                offset: start,
                text: &region[start..end],
            }
        })
        .collect();
    StrategyOutcome::Split(chunks)
}

/// `[n]` / `n.` markers (1 to 3 digits) at the start of lines.
pub fn split_on_markers<'a>(region: &'a str, _config: &ParsingConfig) -> StrategyOutcome<'a> {
    static MARKER_LINE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[ \t]*(?:\[\d{1,3}\]|\d{1,3}\.(?:\s|$))").unwrap());
    let starts: Vec<usize> = lines_with_offsets(region)
        .filter(|(_, line)| MARKER_LINE_RE.is_match(line))
        .map(|(offset, _)| offset)
        .collect();
    split_before_lines(region, &starts)
}

/// A line ending in a separator or a bare word wraps onto the next line.
/// Finished entries end in punctuation, a number, or a DOI/URL.
fn leaves_entry_open(line: &str) -> bool {
    if line.ends_with([',', ';', '&', ':']) {
        return true;
    }
    line.rsplit(char::is_whitespace)
        .next()
        .is_some_and(|word| word.chars().all(char::is_alphabetic))
}

/// Lines beginning `Surname, X`, unless the previous non-blank line was cut
/// mid-entry (`Smith, J., Jones, K., &` wrapping onto `Doe, A.`).
pub fn split_on_author_lines<'a>(region: &'a str, _config: &ParsingConfig) -> StrategyOutcome<'a> {
    static AUTHOR_LINE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[ \t]*\p{Lu}[\p{L}'\u{2019}-]+(?:\s+\p{Lu}[\p{L}'\u{2019}-]+)?,\s+\p{Lu}").unwrap()
    });
    let mut starts = Vec::new();
    let mut previous: Option<&str> = None;
    for (offset, line) in lines_with_offsets(region) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let opens_entry = previous.is_none_or(|p| !leaves_entry_open(p));
        if opens_entry && AUTHOR_LINE_RE.is_match(line) {
            starts.push(offset);
        }
        previous = Some(trimmed);
    }
    split_before_lines(region, &starts)
}

/// Paragraphs separated by blank lines.
pub fn split_on_blank_lines<'a>(region: &'a str, _config: &ParsingConfig) -> StrategyOutcome<'a> {
    static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\r?\n").unwrap());
    let mut chunks = Vec::new();
    let mut start = 0;
    for m in BLANK_LINE_RE.find_iter(region) {
        chunks.push(Chunk {
            offset: start,
            text: &region[start..m.start()],
        });
        start = m.end();
    }
    chunks.push(Chunk {
        offset: start,
        text: &region[start..],
    });
    if chunks.iter().all(|c| c.text.trim().is_empty()) {
        return StrategyOutcome::NoMatch;
    }
    StrategyOutcome::Split(chunks)
}

/// Trim chunks and drop those too short to be a reference.
fn keep_entries<'a>(chunks: Vec<Chunk<'a>>, config: &ParsingConfig) -> Vec<Chunk<'a>> {
    chunks
        .into_iter()
        .filter_map(|c| {
            let leading = c.text.len() - c.text.trim_start().len();
            let text = c.text.trim();
            (normalize_text(text).len() >= config.min_entry_chars).then_some(Chunk {
                offset: c.offset + leading,
                text,
            })
        })
        .collect()
}

/// Segment the document into raw reference entries.
///
/// Strategies are tried in order; the first one that yields more than one
/// entry after the length filter wins. Returns the winning strategy with its
/// entries, or `None` when no strategy does.
pub fn segment_with_strategy(
    doc: &DocumentText,
    config: &ParsingConfig,
) -> Option<(SegmentationStrategy, Vec<RawReferenceEntry>)> {
    let region = find_reference_region(doc.text(), config);
    let region_text = &doc.text()[region.start..region.end];
    tracing::debug!(
        start = region.start,
        end = region.end,
        header_found = region.header_found,
        "reference region located"
    );

    for (strategy, split) in STRATEGIES {
        let StrategyOutcome::Split(chunks) = split(region_text, config) else {
            continue;
        };
        let chunks = keep_entries(chunks, config);
        if chunks.len() <= 1 {
            tracing::debug!(?strategy, kept = chunks.len(), "strategy rejected");
            continue;
        }
        tracing::debug!(?strategy, entries = chunks.len(), "segmentation succeeded");
        let entries = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let offset = region.start + chunk.offset;
                RawReferenceEntry {
                    index,
                    offset,
                    page: doc.page_at(offset),
                    text: chunk.text.to_string(),
                }
            })
            .collect();
        return Some((strategy, entries));
    }
    None
}

/// Segment the document into raw reference entries; empty when no strategy
/// finds more than one entry.
pub fn segment(doc: &DocumentText, config: &ParsingConfig) -> Vec<RawReferenceEntry> {
    segment_with_strategy(doc, config)
        .map(|(_, entries)| entries)
        .unwrap_or_default()
}
