//! Metadata source trait and implementations for querying bibliographic services.

pub mod arxiv;
pub mod crossref;
pub mod mock;
pub mod semantic_scholar;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rate_limit::LookupError;
use crate::{CandidateRecord, Config, ConfigError};

/// Boxed future returned by [`MetadataSource::search_by_title`].
pub type SearchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<CandidateRecord>, LookupError>> + Send + 'a>>;

/// A bibliographic service that can be searched by title.
pub trait MetadataSource: Send + Sync {
    /// The canonical name of this source (e.g., "CrossRef", "arXiv").
    fn name(&self) -> &str;

    /// Return up to `limit` candidate records for a normalized title.
    ///
    /// An empty vector means the source answered but found nothing.
    fn search_by_title<'a>(
        &'a self,
        title: &'a str,
        limit: usize,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> SearchFuture<'a>;
}

/// The sources that can be enabled from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[serde(rename = "crossref")]
    CrossRef,
    SemanticScholar,
    Arxiv,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::CrossRef => "crossref",
            SourceKind::SemanticScholar => "semantic_scholar",
            SourceKind::Arxiv => "arxiv",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "crossref" => Ok(SourceKind::CrossRef),
            "semantic_scholar" | "s2" => Ok(SourceKind::SemanticScholar),
            "arxiv" => Ok(SourceKind::Arxiv),
            _ => Err(ConfigError::UnknownSource(s.to_string())),
        }
    }
}

/// Instantiate the enabled sources in configuration order, de-duplicated.
pub fn build_sources(config: &Config) -> Vec<Arc<dyn MetadataSource>> {
    let mut seen = Vec::new();
    let mut sources: Vec<Arc<dyn MetadataSource>> = Vec::new();
    for kind in &config.sources {
        if seen.contains(kind) {
            continue;
        }
        seen.push(*kind);
        match kind {
            SourceKind::CrossRef => sources.push(Arc::new(crossref::CrossRef {
                mailto: config.crossref_mailto.clone(),
            })),
            SourceKind::SemanticScholar => {
                sources.push(Arc::new(semantic_scholar::SemanticScholar {
                    api_key: config.s2_api_key.clone(),
                }))
            }
            SourceKind::Arxiv => sources.push(Arc::new(arxiv::Arxiv)),
        }
    }
    sources
}

/// Build a query string from the first `max_words` words of a title.
pub(crate) fn query_words(title: &str, max_words: usize) -> String {
    title
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse the leading 4-digit year out of a date string ("2017-06-12", "2017").
pub(crate) fn leading_year(date: &str) -> Option<i32> {
    date.get(..4).and_then(|y| y.parse().ok())
}
