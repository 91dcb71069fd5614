use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use citecheck_core::normalize::normalize_title;

use crate::authors::{AuthorBoundary, author_boundary};
use crate::year::YearToken;

/// Abbreviations whose period never ends a title sentence.
static MID_SENTENCE_ABBREVIATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["vs", "eg", "e.g", "ie", "i.e", "cf", "etc", "fig", "no", "vol"]
        .into_iter()
        .collect()
});

static QUOTE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#""([^"]+)""#,
        r"\u{201C}([^\u{201D}]+)\u{201D}",
        r"\u{2018}([^\u{2019}]+)\u{2019}",
        // Straight single quotes only count at word boundaries; `Don't` inside is fine
        r"(?:^|[^\p{L}\p{N}])'((?:[^']|\p{L}'\p{L})+)'(?:[^\p{L}\p{N}]|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Anything that starts the venue part of a citation.
static VENUE_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"[.,?!]\s+In:?\s",
        r"|(?i:\bproc\.)",
        r"|(?i:\bproceedings\b)",
        r"|(?i:\barxiv\b)",
        r"|\bIEEE\s+Trans",
        r"|\b(?:J|Int|Trans|Ann|Comput|Commun|Phys|Mach|Rev|Lett|Sci|Syst|Inf|Math|Stat|Theor|Appl|Artif|Intell|Anal)\.\s*\p{Lu}",
        r"|\b\d+\s*\(\d+\)",
        r"|\b\d+\s*:\s*\d+",
    ))
    .unwrap()
});

/// A year token with its surrounding brackets and punctuation, at the start.
static LEADING_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[(\[]?\d{4}[a-z]?[)\]]?[\s.,:;]*").unwrap());

fn trim_leading_punct(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ')' | ']' | '.' | ',' | ':' | ';'))
}

/// Longest quoted substring, normalized. `None` if no quote yields any words.
pub fn quoted_title(text: &str) -> Option<String> {
    QUOTE_PATTERNS
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .filter(|inner| inner.trim() == *inner)
        .max_by_key(|inner| inner.chars().count())
        .map(normalize_title)
        .filter(|t| !t.is_empty())
}

/// Cut at the first sentence-ending period that leaves at least two words.
pub(crate) fn truncate_at_sentence_end(title: &str) -> &str {
    for (pos, c) in title.char_indices() {
        if c != '.' {
            continue;
        }
        if !title[pos + 1..].chars().next().is_none_or(char::is_whitespace) {
            continue;
        }
        let head = &title[..pos];
        let last_word = head.rsplit(char::is_whitespace).next().unwrap_or("");
        if MID_SENTENCE_ABBREVIATIONS.contains(last_word.to_lowercase().as_str()) {
            continue;
        }
        if head.split_whitespace().count() >= 2 {
            return head;
        }
    }
    title
}

/// Title between the author block and the first venue marker.
fn unquoted_title(text: &str, boundary: Option<AuthorBoundary>, max_year: i32) -> Option<String> {
    let start = boundary.map_or(0, |b| b.end);
    let rest = trim_leading_punct(&text[start..]);
    let rest = match LEADING_YEAR_RE.find(rest) {
        Some(m) => trim_leading_punct(&rest[m.end()..]),
        None => rest,
    };

    let marker = VENUE_MARKER_RE.find(rest).map(|m| m.start());
    let year = crate::year::year_tokens(rest, max_year).first().map(|y| y.start);
    let end = match (marker, year) {
        (Some(m), Some(y)) => m.min(y),
        (Some(m), None) => m,
        (None, Some(y)) => y,
        (None, None) => return None,
    };

    let segment = truncate_at_sentence_end(rest[..end].trim());
    let title = normalize_title(segment);
    (!title.is_empty()).then_some(title)
}

/// Title of a cleaned citation, normalized. `None` when it cannot be found.
pub fn extract_title(text: &str, years: &[YearToken], max_year: i32) -> Option<String> {
    quoted_title(text).or_else(|| unquoted_title(text, author_boundary(text, years), max_year))
}
