use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod backend;
pub mod cache;
pub mod checker;
pub mod classifier;
pub mod config_file;
pub mod db;
pub mod normalize;
pub mod pool;
pub mod rate_limit;
pub mod report;
pub mod scoring;

// Re-export for convenience
pub use backend::{BackendError, PageText, PdfBackend, TextFileBackend};
pub use cache::{DEFAULT_NEGATIVE_TTL, DEFAULT_POSITIVE_TTL, QueryCache};
pub use db::{MetadataSource, SourceKind};
pub use rate_limit::{LookupError, RateLimiters, RetryPolicy};
pub use report::{Report, ReportSummary};
pub use scoring::ScoringWeights;

/// One reference entry cut out of the bibliography region, before parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReferenceEntry {
    /// 0-based position in the segmented list.
    pub index: usize,
    /// Byte offset of the entry in the concatenated document text.
    pub offset: usize,
    /// 1-based page on which the entry starts.
    pub page: usize,
    pub text: String,
}

/// Structured fields extracted from one raw reference entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCitation {
    pub raw_text: String,
    /// Normalized surnames, in citation order.
    pub authors: Vec<String>,
    /// Normalized title.
    pub title: Option<String>,
    pub year: Option<i32>,
    /// Set when no title could be extracted; such citations are never looked up.
    pub low_confidence: bool,
}

impl ParsedCitation {
    pub fn new(
        raw_text: impl Into<String>,
        authors: Vec<String>,
        title: Option<String>,
        year: Option<i32>,
    ) -> Self {
        let title = title.filter(|t| !t.trim().is_empty());
        Self {
            raw_text: raw_text.into(),
            authors,
            low_confidence: title.is_none(),
            title,
            year,
        }
    }
}

/// A metadata record returned by a bibliographic source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub title: String,
    /// Author names as the source returned them.
    pub authors: Vec<String>,
    pub year: Option<i32>,
    /// Provider-specific identifier (DOI, paper id, arXiv id).
    pub source_id: String,
    /// Name of the source that produced this record.
    pub source: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Final classification of a citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Verified,
    Unverified,
}

/// Why a citation ended up unverified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnverifiedReason {
    /// No title was parsed, so there was nothing to search for.
    NoTitle,
    /// Every enabled source failed, even after retries.
    LookupFailed { message: String },
    /// Sources answered but returned no candidates.
    NoCandidates,
    /// The closest candidate scored below the verification threshold.
    BelowThreshold,
    /// The run was cancelled before this citation was looked up.
    Cancelled,
}

/// Closest candidate returned by one source, with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMatch {
    pub source: String,
    pub candidate: CandidateRecord,
    pub score: f64,
}

/// Outcome of verifying one citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub citation: ParsedCitation,
    pub best_candidate: Option<CandidateRecord>,
    pub score: f64,
    pub status: MatchStatus,
    pub reason: Option<UnverifiedReason>,
    /// Best candidate of every source that returned any, in source order.
    #[serde(default)]
    pub per_source: Vec<SourceMatch>,
}

impl MatchResult {
    /// An unverified result with no candidate and a zero score.
    pub fn unmatched(citation: ParsedCitation, reason: UnverifiedReason) -> Self {
        Self {
            citation,
            best_candidate: None,
            score: 0.0,
            status: MatchStatus::Unverified,
            reason: Some(reason),
            per_source: Vec::new(),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == MatchStatus::Verified
    }
}

/// Invalid configuration values. Always rejected before any citation is processed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a finite, non-negative number (got {value})")]
    InvalidWeight { field: &'static str, value: f64 },
    #[error("scoring weights must sum to a value in (0, 1] (got {0})")]
    WeightSum(f64),
    #[error("verification threshold must be within [0, 1] (got {0})")]
    Threshold(f64),
    #[error("{field} must be within {range} (got {value})")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: f64,
    },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("retry base delay ({base:?}) exceeds max delay ({max:?})")]
    Backoff { base: Duration, max: Duration },
    #[error("unknown metadata source: {0}")]
    UnknownSource(String),
    #[error("no metadata sources enabled")]
    NoSources,
    #[error("could not load config file {0}")]
    File(String),
}

/// Progress events emitted during verification.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Checking {
        index: usize,
        total: usize,
        title: String,
    },
    Result {
        index: usize,
        total: usize,
        result: Box<MatchResult>,
    },
    Retrying {
        index: usize,
        source: String,
        attempt: u32,
        backoff: Duration,
    },
    LookupFailed {
        index: usize,
        source: String,
        message: String,
    },
}

/// Configuration for the verification engine.
#[derive(Clone)]
pub struct Config {
    pub weights: ScoringWeights,
    /// Minimum best score for a citation to count as verified.
    pub verify_threshold: f64,
    /// Maximum candidates requested per source (K).
    pub candidate_limit: usize,
    pub num_workers: usize,
    pub db_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub sources: Vec<SourceKind>,
    pub crossref_mailto: Option<String>,
    pub s2_api_key: Option<String>,
    pub rate_limiters: Arc<RateLimiters>,
    pub query_cache: Option<Arc<QueryCache>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("weights", &self.weights)
            .field("verify_threshold", &self.verify_threshold)
            .field("candidate_limit", &self.candidate_limit)
            .field("num_workers", &self.num_workers)
            .field("db_timeout_secs", &self.db_timeout_secs)
            .field("retry", &self.retry)
            .field("sources", &self.sources)
            .field(
                "crossref_mailto",
                &self.crossref_mailto.as_ref().map(|_| "***"),
            )
            .field("s2_api_key", &self.s2_api_key.as_ref().map(|_| "***"))
            .field(
                "query_cache",
                &self.query_cache.as_ref().map(|c| format!("{:?}", c)),
            )
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            verify_threshold: 0.75,
            candidate_limit: 5,
            num_workers: 4,
            db_timeout_secs: 10,
            retry: RetryPolicy::default(),
            sources: vec![SourceKind::CrossRef],
            crossref_mailto: None,
            s2_api_key: None,
            rate_limiters: Arc::new(RateLimiters::default()),
            query_cache: Some(Arc::new(QueryCache::default())),
        }
    }
}

impl Config {
    /// Reject out-of-range values. Called before any citation is processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        if !self.verify_threshold.is_finite() || !(0.0..=1.0).contains(&self.verify_threshold) {
            return Err(ConfigError::Threshold(self.verify_threshold));
        }
        if self.candidate_limit == 0 {
            return Err(ConfigError::Zero("candidate_limit"));
        }
        if self.num_workers == 0 {
            return Err(ConfigError::Zero("num_workers"));
        }
        if self.db_timeout_secs == 0 {
            return Err(ConfigError::Zero("db_timeout_secs"));
        }
        self.retry.validate()?;
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        Ok(())
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.db_timeout_secs)
    }
}

/// Verify parsed citations against the configured metadata sources.
///
/// Rejects an invalid config before doing any work. Citations are processed
/// concurrently by `config.num_workers` workers; the returned report keeps the
/// input order within each status group. The run can be cancelled via the
/// CancellationToken.
pub async fn check_citations(
    citations: Vec<ParsedCitation>,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<Report, ConfigError> {
    checker::check_citations(citations, config, progress, cancel).await
}
