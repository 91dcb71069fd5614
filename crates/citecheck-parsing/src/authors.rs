use once_cell::sync::Lazy;
use regex::Regex;

use citecheck_core::normalize::surname_of;

use crate::year::YearToken;

/// What ended the author block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Year,
    Quote,
    Period,
    Colon,
}

/// End of the author block in a cleaned citation string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorBoundary {
    pub kind: BoundaryKind,
    /// Byte offset where the author block stops.
    pub start: usize,
    /// Byte offset just past the boundary token.
    pub end: usize,
}

/// An opening quote: at the start or after a non-letter, followed by a letter or digit.
static OPEN_QUOTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|[^\p{L}\p{N}])(["\u{201C}\u{2018}'])[\p{L}\p{N}]"#).unwrap());

/// Name suffixes whose period does not end the author block.
static NON_TERMINAL_ABBREV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:jr|sr)$").unwrap());

/// Offset of the first period that does not follow an initial.
///
/// `J.` and `J.-P.` are initials; `Smith.` is not.
pub(crate) fn first_real_period(text: &str) -> Option<usize> {
    for (pos, c) in text.char_indices() {
        if c != '.' {
            continue;
        }
        let head = &text[..pos];
        let mut rev = head.chars().rev();
        let Some(prev) = rev.next() else {
            continue;
        };
        if prev.is_uppercase() && !rev.next().is_some_and(char::is_alphabetic) {
            continue;
        }
        if NON_TERMINAL_ABBREV_RE.is_match(head) {
            continue;
        }
        return Some(pos);
    }
    None
}

/// LNCS style `Smith, J., Doe, A.: Title` puts a colon after the authors.
fn first_colon(text: &str) -> Option<usize> {
    text.char_indices()
        .find(|&(i, c)| c == ':' && text[i + 1..].starts_with(' '))
        .map(|(i, _)| i)
}

/// Earliest of the first year token, the first title-opening quote, the
/// first real period and an LNCS colon. `None` if none of them occur.
pub fn author_boundary(text: &str, years: &[YearToken]) -> Option<AuthorBoundary> {
    let mut candidates = Vec::with_capacity(4);
    if let Some(y) = years.first() {
        candidates.push(AuthorBoundary {
            kind: BoundaryKind::Year,
            start: y.start,
            end: y.end,
        });
    }
    if let Some(q) = OPEN_QUOTE_RE.captures(text).and_then(|c| c.get(1)) {
        candidates.push(AuthorBoundary {
            kind: BoundaryKind::Quote,
            start: q.start(),
            end: q.end(),
        });
    }
    if let Some(p) = first_real_period(text) {
        candidates.push(AuthorBoundary {
            kind: BoundaryKind::Period,
            start: p,
            end: p + 1,
        });
    }
    if let Some(c) = first_colon(text) {
        candidates.push(AuthorBoundary {
            kind: BoundaryKind::Colon,
            start: c,
            end: c + 1,
        });
    }
    candidates.into_iter().min_by_key(|b| b.start)
}

/// Fragment made only of initials: `J.`, `J.-P.`, `A. B.`, or Springer `JP`.
fn is_initials_only(fragment: &str) -> bool {
    static SPRINGER_INITIALS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\p{Lu}{1,3}$").unwrap());
    if SPRINGER_INITIALS.is_match(fragment) {
        return true;
    }
    fragment
        .split(|c: char| c == '.' || c == '-' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .all(|t| {
            let mut chars = t.chars();
            chars.next().is_some_and(char::is_uppercase) && chars.next().is_none()
        })
}

/// Given names of an inverted `Surname, Given` author: `John`, `Jean-Pierre`, `John A.`.
fn is_given_names(fragment: &str) -> bool {
    static GIVEN_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^\p{Lu}\p{Ll}+(?:-\p{Lu}\p{Ll}+)?(?:\s+\p{Lu}\.?)*$").unwrap()
    });
    GIVEN_RE.is_match(fragment)
}

/// Fragments of an author block, each flagged with whether a comma preceded it.
fn split_fragments(block: &str) -> Vec<(bool, &str)> {
    static SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*(?:[;,&]|\band\b)\s*").unwrap());
    let mut fragments = Vec::new();
    let mut start = 0;
    let mut after_comma = false;
    for sep in SPLIT_RE.find_iter(block) {
        fragments.push((after_comma, &block[start..sep.start()]));
        after_comma = sep.as_str().trim() == ",";
        start = sep.end();
    }
    fragments.push((after_comma, &block[start..]));
    fragments
}

/// Split an author block into normalized surnames.
///
/// In the inverted `Smith, John` form the fragment after a one-word surname
/// is its given name and is dropped, like initials are.
pub fn parse_author_block(block: &str, max_authors: usize) -> Vec<String> {
    static ET_AL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\bet\.?\s+al\b\.?$").unwrap());
    static OTHERS_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)^(?:et\.?\s+al\.?|others|et\s+others)$").unwrap());

    let mut authors = Vec::new();
    let mut awaiting_given = false;
    for (after_comma, fragment) in split_fragments(block) {
        let fragment = ET_AL_RE.replace(fragment.trim(), "");
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }
        if OTHERS_RE.is_match(fragment) || is_initials_only(fragment) {
            awaiting_given = false;
            continue;
        }
        if awaiting_given && after_comma && is_given_names(fragment) {
            awaiting_given = false;
            continue;
        }
        let surname = surname_of(fragment);
        if surname.is_empty() {
            continue;
        }
        awaiting_given = !fragment.contains(char::is_whitespace);
        authors.push(surname);
        if authors.len() >= max_authors {
            break;
        }
    }
    authors
}

/// Authors of a cleaned citation, as normalized surnames.
///
/// No author boundary means no authors.
pub fn extract_authors(text: &str, years: &[YearToken], max_authors: usize) -> Vec<String> {
    let Some(boundary) = author_boundary(text, years) else {
        return Vec::new();
    };
    let block = text[..boundary.start].trim_end_matches(|c: char| {
        c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':' | '(' | '[')
    });
    parse_author_block(block, max_authors)
}
