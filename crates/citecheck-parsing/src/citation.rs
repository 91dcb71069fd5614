use once_cell::sync::Lazy;
use regex::Regex;

use citecheck_core::ParsedCitation;
use citecheck_core::normalize::{collapse_whitespace, join_hyphenated_lines};

use crate::config::ParsingConfig;
use crate::{authors, title, year};

/// Leading list marker: `[12]` or `12.`.
static MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:\[\d{1,3}\]|\d{1,3}\.)\s*").unwrap());

/// Strip the list marker, repair hyphenated line breaks, collapse whitespace.
pub fn clean_entry_text(raw: &str) -> String {
    let text = MARKER_RE.replace(raw, "");
    collapse_whitespace(&join_hyphenated_lines(&text))
}

/// Parse one raw reference entry. Never fails: fields that cannot be found
/// are left empty and each field is extracted independently.
pub fn parse_citation(raw: &str, config: &ParsingConfig) -> ParsedCitation {
    let text = clean_entry_text(raw);
    let years = year::year_tokens(&text, config.max_year);

    let year = years.last().map(|y| y.value);
    let authors = authors::extract_authors(&text, &years, config.max_authors);
    let title = title::extract_title(&text, &years, config.max_year);

    if title.is_none() {
        tracing::debug!(entry = %text, "no title found");
    }
    ParsedCitation::new(text, authors, title, year)
}
