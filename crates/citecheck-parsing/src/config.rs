use chrono::Datelike;
use citecheck_core::ConfigError;
use citecheck_core::config_file::ParsingSection;
use citecheck_core::normalize::normalize_text;

/// Headings that open the bibliography, in normalized form.
pub const DEFAULT_SECTION_HEADERS: &[&str] =
    &["references", "bibliography", "works cited", "literature cited"];

/// Headings that close the bibliography, in normalized form.
pub const DEFAULT_END_HEADINGS: &[&str] = &[
    "appendix",
    "appendices",
    "acknowledgments",
    "acknowledgements",
    "acknowledgment",
    "acknowledgement",
    "supplementary material",
    "supplementary materials",
    "supplementary",
    "supplemental material",
    "supplemental",
    "proofs",
    "author biographies",
];

/// Controls how a list of values is overridden from its defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ListOverride<T> {
    /// Use the built-in defaults.
    #[default]
    Default,
    /// Completely replace the defaults with these values.
    Replace(Vec<T>),
    /// Append these values to the defaults.
    Extend(Vec<T>),
}

impl<T: Clone> ListOverride<T> {
    /// Resolve this override against the given defaults.
    pub fn resolve(&self, defaults: &[T]) -> Vec<T> {
        match self {
            ListOverride::Default => defaults.to_vec(),
            ListOverride::Replace(v) => v.clone(),
            ListOverride::Extend(v) => {
                let mut result = defaults.to_vec();
                result.extend(v.iter().cloned());
                result
            }
        }
    }
}

/// Configuration for bibliography segmentation and citation parsing.
///
/// Build one with [`ParsingConfigBuilder`]; `Default` gives the built-in values.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsingConfig {
    /// Normalized header lines that start the reference region.
    pub(crate) section_headers: Vec<String>,
    /// Normalized heading lines that end it.
    pub(crate) end_headings: Vec<String>,
    /// Trailing share of the document used when no header is found.
    pub(crate) fallback_fraction: f64,
    /// Entries shorter than this (normalized) are dropped.
    pub(crate) min_entry_chars: usize,
    pub(crate) max_authors: usize,
    /// Latest year accepted as a publication year.
    pub(crate) max_year: i32,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            section_headers: DEFAULT_SECTION_HEADERS.iter().map(|s| s.to_string()).collect(),
            end_headings: DEFAULT_END_HEADINGS.iter().map(|s| s.to_string()).collect(),
            fallback_fraction: 0.25,
            min_entry_chars: 20,
            max_authors: 10,
            max_year: default_max_year(),
        }
    }
}

/// Next calendar year, so in-press work still parses.
fn default_max_year() -> i32 {
    chrono::Local::now().year() + 1
}

impl ParsingConfig {
    pub fn section_headers(&self) -> &[String] {
        &self.section_headers
    }

    pub fn end_headings(&self) -> &[String] {
        &self.end_headings
    }

    pub fn fallback_fraction(&self) -> f64 {
        self.fallback_fraction
    }

    pub fn min_entry_chars(&self) -> usize {
        self.min_entry_chars
    }

    pub fn max_authors(&self) -> usize {
        self.max_authors
    }

    pub fn max_year(&self) -> i32 {
        self.max_year
    }
}

/// Builder for [`ParsingConfig`].
///
/// Heading lists are normalized in [`build()`](Self::build), which also
/// rejects out-of-range values.
#[derive(Debug, Clone, Default)]
pub struct ParsingConfigBuilder {
    section_headers: ListOverride<String>,
    end_headings: ListOverride<String>,
    fallback_fraction: Option<f64>,
    min_entry_chars: Option<usize>,
    max_authors: Option<usize>,
    max_year: Option<i32>,
}

impl ParsingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the `[parsing]` table of a config file.
    pub fn from_file_section(section: &ParsingSection) -> Self {
        let mut builder = Self::new();
        if let Some(headers) = &section.section_headers {
            builder = builder.set_section_headers(headers.clone());
        }
        if let Some(headings) = &section.end_headers {
            builder = builder.set_end_headings(headings.clone());
        }
        if let Some(f) = section.fallback_fraction {
            builder = builder.fallback_fraction(f);
        }
        if let Some(n) = section.min_entry_chars {
            builder = builder.min_entry_chars(n);
        }
        if let Some(n) = section.max_authors {
            builder = builder.max_authors(n);
        }
        builder
    }

    // ── Headings ──

    pub fn set_section_headers(mut self, headers: Vec<String>) -> Self {
        self.section_headers = ListOverride::Replace(headers);
        self
    }

    pub fn add_section_header(mut self, header: String) -> Self {
        match &mut self.section_headers {
            ListOverride::Extend(v) => v.push(header),
            _ => self.section_headers = ListOverride::Extend(vec![header]),
        }
        self
    }

    pub fn set_end_headings(mut self, headings: Vec<String>) -> Self {
        self.end_headings = ListOverride::Replace(headings);
        self
    }

    pub fn add_end_heading(mut self, heading: String) -> Self {
        match &mut self.end_headings {
            ListOverride::Extend(v) => v.push(heading),
            _ => self.end_headings = ListOverride::Extend(vec![heading]),
        }
        self
    }

    // ── Scalars ──

    pub fn fallback_fraction(mut self, fraction: f64) -> Self {
        self.fallback_fraction = Some(fraction);
        self
    }

    pub fn min_entry_chars(mut self, n: usize) -> Self {
        self.min_entry_chars = Some(n);
        self
    }

    pub fn max_authors(mut self, n: usize) -> Self {
        self.max_authors = Some(n);
        self
    }

    pub fn max_year(mut self, year: i32) -> Self {
        self.max_year = Some(year);
        self
    }

    /// Validate every value and produce a [`ParsingConfig`].
    pub fn build(self) -> Result<ParsingConfig, ConfigError> {
        let defaults = ParsingConfig::default();

        let fallback_fraction = self.fallback_fraction.unwrap_or(defaults.fallback_fraction);
        if !fallback_fraction.is_finite() || fallback_fraction <= 0.0 || fallback_fraction > 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "fallback_fraction",
                range: "(0, 1]",
                value: fallback_fraction,
            });
        }

        let min_entry_chars = self.min_entry_chars.unwrap_or(defaults.min_entry_chars);
        if min_entry_chars == 0 {
            return Err(ConfigError::Zero("min_entry_chars"));
        }
        let max_authors = self.max_authors.unwrap_or(defaults.max_authors);
        if max_authors == 0 {
            return Err(ConfigError::Zero("max_authors"));
        }

        let max_year = self.max_year.unwrap_or(defaults.max_year);
        if max_year < crate::year::MIN_YEAR {
            return Err(ConfigError::OutOfRange {
                field: "max_year",
                range: ">= 1500",
                value: f64::from(max_year),
            });
        }

        let normalize_list = |list: &ListOverride<String>, defaults: &[String]| {
            let mut out: Vec<String> = Vec::new();
            for h in list.resolve(defaults) {
                let h = normalize_text(&h);
                if !h.is_empty() && !out.contains(&h) {
                    out.push(h);
                }
            }
            out
        };

        let section_headers = normalize_list(&self.section_headers, &defaults.section_headers);
        if section_headers.is_empty() {
            return Err(ConfigError::Empty("section_headers"));
        }
        let end_headings = normalize_list(&self.end_headings, &defaults.end_headings);

        Ok(ParsingConfig {
            section_headers,
            end_headings,
            fallback_fraction,
            min_entry_chars,
            max_authors,
            max_year,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ParsingConfig::default();
        assert_eq!(config.min_entry_chars, 20);
        assert_eq!(config.max_authors, 10);
        assert!((config.fallback_fraction - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.max_year, chrono::Local::now().year() + 1);
        assert!(config.section_headers.contains(&"works cited".to_string()));
    }

    #[test]
    fn test_builder_basic() {
        let config = ParsingConfigBuilder::new()
            .min_entry_chars(10)
            .max_authors(3)
            .fallback_fraction(0.4)
            .max_year(2030)
            .build()
            .unwrap();
        assert_eq!(config.min_entry_chars, 10);
        assert_eq!(config.max_authors, 3);
        assert!((config.fallback_fraction - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.max_year, 2030);
    }

    #[test]
    fn test_headers_are_normalized_and_deduplicated() {
        let config = ParsingConfigBuilder::new()
            .set_section_headers(vec!["Bibliografía".into(), "  BIBLIOGRAFIA ".into()])
            .build()
            .unwrap();
        assert_eq!(config.section_headers, vec!["bibliografia"]);
    }

    #[test]
    fn test_add_header_extends_defaults() {
        let config = ParsingConfigBuilder::new()
            .add_section_header("Literatur".into())
            .build()
            .unwrap();
        assert!(config.section_headers.contains(&"references".to_string()));
        assert!(config.section_headers.contains(&"literatur".to_string()));
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(matches!(
            ParsingConfigBuilder::new().fallback_fraction(0.0).build(),
            Err(ConfigError::OutOfRange { field: "fallback_fraction", .. })
        ));
        assert!(matches!(
            ParsingConfigBuilder::new().fallback_fraction(1.5).build(),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert_eq!(
            ParsingConfigBuilder::new().min_entry_chars(0).build(),
            Err(ConfigError::Zero("min_entry_chars"))
        );
        assert_eq!(
            ParsingConfigBuilder::new().max_authors(0).build(),
            Err(ConfigError::Zero("max_authors"))
        );
        assert_eq!(
            ParsingConfigBuilder::new()
                .set_section_headers(vec!["  ".into()])
                .build(),
            Err(ConfigError::Empty("section_headers"))
        );
    }

    #[test]
    fn test_from_file_section() {
        let section = ParsingSection {
            fallback_fraction: Some(0.5),
            max_authors: Some(4),
            section_headers: Some(vec!["Literature".into()]),
            ..Default::default()
        };
        let config = ParsingConfigBuilder::from_file_section(&section).build().unwrap();
        assert_eq!(config.max_authors, 4);
        assert_eq!(config.section_headers, vec!["literature"]);
        assert!((config.fallback_fraction - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_list_override_resolve() {
        let defaults = vec!["a".to_string(), "b".to_string()];
        let r: ListOverride<String> = ListOverride::Replace(vec!["x".to_string()]);
        assert_eq!(r.resolve(&defaults), vec!["x".to_string()]);
        let e: ListOverride<String> = ListOverride::Extend(vec!["c".to_string()]);
        assert_eq!(e.resolve(&defaults), vec!["a", "b", "c"]);
    }
}
