use once_cell::sync::Lazy;
use regex::Regex;

/// Earliest year accepted as a publication year.
pub const MIN_YEAR: i32 = 1500;

/// A plausible publication year found in a citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearToken {
    pub value: i32,
    /// Byte range of the token, including a letter suffix (`2015a`).
    pub start: usize,
    pub end: usize,
}

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})[a-z]?\b").unwrap());

fn is_dash(c: char) -> bool {
    matches!(c, '-' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}')
}

/// `1899–1907`, `12-2015`: either side of a numeric range is a page number.
fn in_numeric_range(text: &str, start: usize, end: usize) -> bool {
    let mut after = text[end..].chars().skip_while(|c| *c == ' ');
    if after.next().is_some_and(is_dash) && after.find(|c| *c != ' ').is_some_and(|c| c.is_ascii_digit()) {
        return true;
    }
    let mut before = text[..start].chars().rev().skip_while(|c| *c == ' ');
    before.next().is_some_and(is_dash)
        && before.find(|c| *c != ' ').is_some_and(|c| c.is_ascii_digit())
}

/// Part of a DOI, arXiv id or decimal number (`1706.03762`, `10.1145/1706`).
fn in_identifier(text: &str, start: usize, end: usize) -> bool {
    let mut after = text[end..].chars();
    if matches!(after.next(), Some('.' | '/')) && after.next().is_some_and(|c| c.is_ascii_digit()) {
        return true;
    }
    let mut before = text[..start].chars().rev();
    matches!(before.next(), Some('.' | '/')) && before.next().is_some_and(|c| c.is_ascii_digit())
}

/// Every year token in `[MIN_YEAR, max_year]`, left to right.
///
/// Range endpoints and identifier fragments are skipped.
pub fn year_tokens(text: &str, max_year: i32) -> Vec<YearToken> {
    YEAR_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let value: i32 = caps.get(1)?.as_str().parse().ok()?;
            if !(MIN_YEAR..=max_year).contains(&value) {
                return None;
            }
            if in_numeric_range(text, whole.start(), whole.end())
                || in_identifier(text, whole.start(), whole.end())
            {
                return None;
            }
            Some(YearToken {
                value,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// The publication year: the rightmost year token.
pub fn extract_year(text: &str, max_year: i32) -> Option<i32> {
    year_tokens(text, max_year).last().map(|t| t.value)
}
