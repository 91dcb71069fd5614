//! Text normalization shared by the parser and the scorer.
//!
//! Everything that gets compared goes through here first, so a citation title
//! parsed from a PDF and a title returned by a metadata source end up in the
//! same canonical form.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

/// Mapping of (diacritic, letter) pairs to precomposed characters.
/// PDF extraction frequently emits the mark as a separate glyph.
static DIACRITIC_COMPOSITIONS: Lazy<HashMap<(&str, &str), &str>> = Lazy::new(|| {
    let table: &[(&str, &[(&str, &str)])] = &[
        (
            "\u{a8}",
            &[
                ("A", "Ä"),
                ("a", "ä"),
                ("E", "Ë"),
                ("e", "ë"),
                ("I", "Ï"),
                ("i", "ï"),
                ("O", "Ö"),
                ("o", "ö"),
                ("U", "Ü"),
                ("u", "ü"),
            ],
        ),
        (
            "\u{b4}",
            &[
                ("A", "Á"),
                ("a", "á"),
                ("E", "É"),
                ("e", "é"),
                ("I", "Í"),
                ("i", "í"),
                ("O", "Ó"),
                ("o", "ó"),
                ("U", "Ú"),
                ("u", "ú"),
                ("N", "Ń"),
                ("n", "ń"),
                ("C", "Ć"),
                ("c", "ć"),
                ("S", "Ś"),
                ("s", "ś"),
            ],
        ),
        (
            "`",
            &[
                ("A", "À"),
                ("a", "à"),
                ("E", "È"),
                ("e", "è"),
                ("O", "Ò"),
                ("o", "ò"),
                ("U", "Ù"),
                ("u", "ù"),
            ],
        ),
        (
            "\u{2dc}",
            &[
                ("A", "Ã"),
                ("a", "ã"),
                ("N", "Ñ"),
                ("n", "ñ"),
                ("O", "Õ"),
                ("o", "õ"),
            ],
        ),
        (
            "\u{2c7}",
            &[
                ("C", "Č"),
                ("c", "č"),
                ("S", "Š"),
                ("s", "š"),
                ("Z", "Ž"),
                ("z", "ž"),
                ("E", "Ě"),
                ("e", "ě"),
                ("R", "Ř"),
                ("r", "ř"),
            ],
        ),
    ];
    let mut m = HashMap::new();
    for (mark, pairs) in table {
        for (letter, composed) in pairs.iter() {
            m.insert((*mark, *letter), *composed);
        }
    }
    m
});

/// Letter followed by space(s) then a diacritic mark (e.g., "B ¨").
static SPACE_BEFORE_DIACRITIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z])\s+([\u{a8}\u{b4}`\u{2dc}\u{2c7}])").unwrap());

/// Diacritic mark followed by optional space then a letter (e.g., "¨U").
static SEPARATED_DIACRITIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\u{a8}\u{b4}`\u{2dc}\u{2c7}])\s*([A-Za-z])").unwrap());

static HYPHENATED_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{L})-[ \t]*\r?\n\s*(\p{L})").unwrap());

static NAME_HONORIFICS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["dr", "prof", "mr", "mrs", "ms", "sir"]
        .into_iter()
        .collect()
});

static NAME_SUFFIXES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["jr", "sr", "ii", "iii", "iv"].into_iter().collect());

/// Particles that belong to the surname ("van der Berg", "de la Cruz").
static SURNAME_PARTICLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "van", "von", "der", "den", "de", "del", "della", "di", "da", "du", "la", "le", "al",
        "el", "ben", "ibn", "bin", "dos", "das", "ter", "ten",
    ]
    .into_iter()
    .collect()
});

/// Fix separated diacritics: `"B ¨UNZ"` → `"BÜNZ"`, `"R´enyi"` → `"Rényi"`.
fn fix_separated_diacritics(text: &str) -> String {
    let text = SPACE_BEFORE_DIACRITIC_RE.replace_all(text, "$1$2");
    SEPARATED_DIACRITIC_RE
        .replace_all(&text, |caps: &regex::Captures| {
            let diacritic = &caps[1];
            let letter = &caps[2];
            DIACRITIC_COMPOSITIONS
                .get(&(diacritic, letter))
                .map(|s| s.to_string())
                .unwrap_or_else(|| letter.to_string())
        })
        .into_owned()
}

fn unescape_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
}

/// Decompose, drop combining marks and anything else outside ASCII.
fn fold_to_ascii(text: &str) -> String {
    text.nfkd().filter(|c| c.is_ascii()).collect()
}

/// Canonical comparison form: ASCII, lowercase, punctuation turned into
/// spaces, single spaces between words, no leading or trailing space.
///
/// Idempotent: `normalize_text(normalize_text(s)) == normalize_text(s)`.
pub fn normalize_text(text: &str) -> String {
    let text = unescape_entities(text);
    let text = fix_separated_diacritics(&text);
    let folded = fold_to_ascii(&text).to_lowercase();
    let spaced: String = folded
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&spaced)
}

/// Titles use the plain text normalization.
pub fn normalize_title(title: &str) -> String {
    normalize_text(title)
}

/// Normalize a personal name. Inner hyphens survive ("garcia-molina"),
/// apostrophes are removed ("o'brien" → "obrien").
pub fn normalize_name(name: &str) -> String {
    let text = unescape_entities(name);
    let text = fix_separated_diacritics(&text);
    let folded = fold_to_ascii(&text).to_lowercase();
    let mut out = String::with_capacity(folded.len());
    for c in folded.chars() {
        match c {
            '\'' | '`' => {}
            '-' => out.push('-'),
            c if c.is_ascii_alphanumeric() => out.push(c),
            _ => out.push(' '),
        }
    }
    collapse_whitespace(&out)
        .split(' ')
        .map(|w| w.trim_matches('-'))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Repair words broken across lines by a hyphen: `"Learn-\ning"` → `"Learning"`.
///
/// When the continuation starts with an uppercase letter the hyphen is kept
/// (`"Garcia-\nMolina"` → `"Garcia-Molina"`).
pub fn join_hyphenated_lines(text: &str) -> String {
    HYPHENATED_BREAK_RE
        .replace_all(text, |caps: &regex::Captures| {
            let next = &caps[2];
            if next.chars().next().is_some_and(|c| c.is_uppercase()) {
                format!("{}-{}", &caps[1], next)
            } else {
                format!("{}{}", &caps[1], next)
            }
        })
        .into_owned()
}

/// True for tokens like "J.", "J", "J.-P.", "A.B.".
fn is_strict_initial(token: &str) -> bool {
    let letters: Vec<&str> = token
        .split(['.', '-'])
        .filter(|s| !s.is_empty())
        .collect();
    !letters.is_empty()
        && letters
            .iter()
            .all(|l| l.chars().count() == 1 && l.chars().all(|c| c.is_alphabetic()))
}

/// Springer style trailing initials: "JA", "JP". Only all-caps, up to three letters.
fn is_springer_initials(token: &str) -> bool {
    let n = token.chars().count();
    (1..=3).contains(&n) && token.chars().all(|c| c.is_uppercase())
}

fn lower_bare(token: &str) -> String {
    token.trim_matches(|c: char| c == '.' || c == ',').to_lowercase()
}

/// Surname of a single author name, normalized.
///
/// Handles "Surname, Given", "Given Surname", and Springer's "Surname JA";
/// drops initials, honorifics and suffixes; keeps particles
/// ("Jan van der Berg" → "van der berg"). Returns an empty string when the
/// name is only initials.
pub fn surname_of(full_name: &str) -> String {
    let name = collapse_whitespace(full_name);
    let name = name.trim_matches(|c: char| c == ',' || c == ';' || c.is_whitespace());
    if name.is_empty() {
        return String::new();
    }

    // "Surname, Given" (suffix-only comma parts such as ", Jr." are ignored)
    let comma_parts: Vec<&str> = name
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty() && !NAME_SUFFIXES.contains(lower_bare(p).as_str()))
        .collect();
    if comma_parts.len() >= 2 {
        return surname_of(comma_parts[0]);
    }
    let name = comma_parts.first().copied().unwrap_or(name);

    let mut tokens: Vec<&str> = name.split_whitespace().collect();
    while tokens
        .first()
        .is_some_and(|t| NAME_HONORIFICS.contains(lower_bare(t).as_str()))
    {
        tokens.remove(0);
    }
    while tokens.len() >= 2
        && tokens
            .last()
            .is_some_and(|t| NAME_SUFFIXES.contains(lower_bare(t).as_str()))
    {
        tokens.pop();
    }

    let mut parts: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|t| !is_strict_initial(t))
        .collect();

    // Springer: "Smith JA". Only when something besides the initials remains.
    if parts.len() >= 2 && parts.last().is_some_and(|t| is_springer_initials(t)) {
        let kept: Vec<&str> = parts
            .iter()
            .copied()
            .filter(|t| !is_springer_initials(t))
            .collect();
        if !kept.is_empty() {
            parts = kept;
        }
    }

    if parts.is_empty() {
        return String::new();
    }

    // Walk back from the last token over any particles.
    let mut start = parts.len() - 1;
    while start > 0 && SURNAME_PARTICLES.contains(lower_bare(parts[start - 1]).as_str()) {
        start -= 1;
    }
    normalize_name(&parts[start..].join(" "))
}
