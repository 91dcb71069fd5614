//! Per-citation verification flow.
//!
//! A citation moves through `Pending → Queried → Scored → MatchResult`. Each
//! stage is its own type, so a result can only be classified after its
//! candidates were scored, and scoring only happens after a lookup.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::cache::QueryCache;
use crate::db::MetadataSource;
use crate::rate_limit::{LookupError, RateLimiters, RetryPolicy, query_with_retry};
use crate::scoring::{ScoreBreakdown, ScoringWeights, score_breakdown};
use crate::{
    CandidateRecord, MatchResult, MatchStatus, ParsedCitation, ProgressEvent, SourceMatch,
    UnverifiedReason,
};

/// Everything a lookup needs, shared by all workers.
pub struct LookupContext<'a> {
    pub sources: &'a [Arc<dyn MetadataSource>],
    pub client: &'a reqwest::Client,
    pub timeout: Duration,
    pub candidate_limit: usize,
    pub rate_limiters: &'a RateLimiters,
    pub retry: &'a RetryPolicy,
    pub cache: Option<&'a QueryCache>,
    pub progress: &'a (dyn Fn(ProgressEvent) + Send + Sync),
}

/// Result of advancing a stage: either the next stage or a final result.
#[derive(Debug)]
pub enum Step<T> {
    Next(T),
    Done(MatchResult),
}

/// A citation that has not been looked up yet.
#[derive(Debug, Clone)]
pub struct Pending {
    pub index: usize,
    pub citation: ParsedCitation,
}

/// A citation together with the merged candidates of every source that answered.
#[derive(Debug, Clone)]
pub struct Queried {
    pub citation: ParsedCitation,
    pub candidates: Vec<CandidateRecord>,
}

/// A citation with its best-scoring candidate, if any, and the best of each source.
#[derive(Debug, Clone)]
pub struct Scored {
    pub citation: ParsedCitation,
    pub best: Option<BestCandidate>,
    pub per_source: Vec<SourceMatch>,
}

#[derive(Debug, Clone)]
pub struct BestCandidate {
    pub candidate: CandidateRecord,
    pub breakdown: ScoreBreakdown,
    pub score: f64,
}

impl Pending {
    pub fn new(index: usize, citation: ParsedCitation) -> Self {
        Self { index, citation }
    }

    /// Look the citation up in every enabled source.
    ///
    /// Finishes early with `NoTitle` when there is nothing to search for,
    /// with `Cancelled` when the token fired, and with `LookupFailed` when
    /// every source failed.
    pub async fn query(self, ctx: &LookupContext<'_>, cancel: &CancellationToken) -> Step<Queried> {
        let Some(title) = self.citation.title.clone() else {
            tracing::debug!(index = self.index, "no title parsed, skipping lookup");
            return Step::Done(MatchResult::unmatched(
                self.citation,
                UnverifiedReason::NoTitle,
            ));
        };

        if cancel.is_cancelled() {
            return Step::Done(MatchResult::unmatched(
                self.citation,
                UnverifiedReason::Cancelled,
            ));
        }

        let index = self.index;
        let lookups = ctx
            .sources
            .iter()
            .map(|source| lookup_source(source.as_ref(), &title, index, ctx));
        let results = join_all(lookups).await;

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        for (source, result) in ctx.sources.iter().zip(results) {
            match result {
                Ok(found) => candidates.extend(found),
                Err(e) => failures.push(format!("{}: {}", source.name(), e)),
            }
        }

        if !ctx.sources.is_empty() && failures.len() == ctx.sources.len() {
            return Step::Done(MatchResult::unmatched(
                self.citation,
                UnverifiedReason::LookupFailed {
                    message: failures.join("; "),
                },
            ));
        }

        tracing::debug!(index, candidates = candidates.len(), "lookup complete");
        Step::Next(Queried {
            citation: self.citation,
            candidates,
        })
    }
}

/// One source lookup through the cache and the retry wrapper.
async fn lookup_source(
    source: &dyn MetadataSource,
    title: &str,
    index: usize,
    ctx: &LookupContext<'_>,
) -> Result<Vec<CandidateRecord>, LookupError> {
    let limit = ctx.candidate_limit;
    if let Some(cache) = ctx.cache
        && let Some(hit) = cache.get(title, source.name(), limit)
    {
        return Ok(hit);
    }

    let on_retry = |attempt: u32, backoff: Duration, _: &LookupError| {
        (ctx.progress)(ProgressEvent::Retrying {
            index,
            source: source.name().to_string(),
            attempt,
            backoff,
        });
    };

    let result = query_with_retry(
        source,
        title,
        limit,
        ctx.client,
        ctx.timeout,
        ctx.rate_limiters,
        ctx.retry,
        &on_retry,
    )
    .await;

    match &result {
        Ok(found) => {
            if let Some(cache) = ctx.cache {
                cache.insert(title, source.name(), limit, found);
            }
        }
        Err(e) => {
            tracing::warn!(index, source = source.name(), error = %e, "lookup failed");
            (ctx.progress)(ProgressEvent::LookupFailed {
                index,
                source: source.name().to_string(),
                message: e.to_string(),
            });
        }
    }
    result
}

impl Queried {
    /// Score every candidate and keep the best one.
    pub fn score(self, weights: &ScoringWeights) -> Scored {
        let best = select_best(&self.citation, &self.candidates, weights).map(|(i, breakdown, score)| {
            BestCandidate {
                candidate: self.candidates[i].clone(),
                breakdown,
                score,
            }
        });
        let per_source = best_per_source(&self.citation, &self.candidates, weights);
        Scored {
            citation: self.citation,
            best,
            per_source,
        }
    }
}

/// Best candidate of each source, in the order sources first appear.
pub fn best_per_source(
    citation: &ParsedCitation,
    candidates: &[CandidateRecord],
    weights: &ScoringWeights,
) -> Vec<SourceMatch> {
    let mut sources: Vec<&str> = Vec::new();
    for candidate in candidates {
        if !sources.contains(&candidate.source.as_str()) {
            sources.push(&candidate.source);
        }
    }
    sources
        .into_iter()
        .filter_map(|source| {
            let own: Vec<CandidateRecord> = candidates
                .iter()
                .filter(|c| c.source == source)
                .cloned()
                .collect();
            let (i, _, score) = select_best(citation, &own, weights)?;
            Some(SourceMatch {
                source: source.to_string(),
                candidate: own[i].clone(),
                score,
            })
        })
        .collect()
}

/// Index, breakdown and score of the best candidate.
///
/// Highest score wins; on equal scores a candidate whose year matched is
/// preferred, then the earlier one.
pub fn select_best(
    citation: &ParsedCitation,
    candidates: &[CandidateRecord],
    weights: &ScoringWeights,
) -> Option<(usize, ScoreBreakdown, f64)> {
    let mut best: Option<(usize, ScoreBreakdown, f64)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let breakdown = score_breakdown(citation, candidate);
        let score = breakdown.combine(weights);
        let better = match &best {
            None => true,
            Some((_, best_breakdown, best_score)) => {
                score > *best_score
                    || (score == *best_score
                        && breakdown.year_matched()
                        && !best_breakdown.year_matched())
            }
        };
        if better {
            best = Some((i, breakdown, score));
        }
    }
    best
}

impl Scored {
    /// Final verified/unverified decision against `threshold`.
    pub fn classify(self, threshold: f64) -> MatchResult {
        match self.best {
            None => MatchResult::unmatched(self.citation, UnverifiedReason::NoCandidates),
            Some(best) => {
                let verified = best.score >= threshold;
                MatchResult {
                    citation: self.citation,
                    best_candidate: Some(best.candidate),
                    score: best.score,
                    status: if verified {
                        MatchStatus::Verified
                    } else {
                        MatchStatus::Unverified
                    },
                    reason: (!verified).then_some(UnverifiedReason::BelowThreshold),
                    per_source: self.per_source,
                }
            }
        }
    }
}

/// Run one citation through every stage.
pub async fn verify_citation(
    pending: Pending,
    ctx: &LookupContext<'_>,
    weights: &ScoringWeights,
    threshold: f64,
    cancel: &CancellationToken,
) -> MatchResult {
    let index = pending.index;
    let result = match pending.query(ctx, cancel).await {
        Step::Done(result) => result,
        Step::Next(queried) => queried.score(weights).classify(threshold),
    };
    tracing::debug!(
        index,
        status = ?result.status,
        score = result.score,
        "citation classified"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::{MockResponse, MockSource};
    use crate::normalize::normalize_title;

    fn citation(title: Option<&str>, authors: &[&str], year: Option<i32>) -> ParsedCitation {
        ParsedCitation::new(
            "raw",
            authors.iter().map(|s| s.to_string()).collect(),
            title.map(normalize_title),
            year,
        )
    }

    struct Fixture {
        sources: Vec<Arc<dyn MetadataSource>>,
        client: reqwest::Client,
        limiters: RateLimiters,
        retry: RetryPolicy,
    }

    impl Fixture {
        fn new(sources: Vec<Arc<MockSource>>) -> Self {
            Self {
                sources: sources
                    .into_iter()
                    .map(|s| s as Arc<dyn MetadataSource>)
                    .collect(),
                client: reqwest::Client::new(),
                limiters: RateLimiters::unlimited(),
                retry: RetryPolicy {
                    jitter: false,
                    ..RetryPolicy::default()
                },
            }
        }

        fn ctx<'a>(&'a self, progress: &'a (dyn Fn(ProgressEvent) + Send + Sync)) -> LookupContext<'a> {
            LookupContext {
                sources: &self.sources,
                client: &self.client,
                timeout: Duration::from_secs(5),
                candidate_limit: 5,
                rate_limiters: &self.limiters,
                retry: &self.retry,
                cache: None,
                progress,
            }
        }
    }

    fn silent() -> impl Fn(ProgressEvent) + Send + Sync {
        |_| {}
    }

    #[tokio::test]
    async fn exact_candidate_is_verified() {
        let source = Arc::new(MockSource::new("Mock").with_default(MockResponse::Found(vec![
            MockSource::candidate("Learning to Rank", &["John Smith", "Alice Doe"], Some(2015)),
        ])));
        let fx = Fixture::new(vec![source]);
        let progress = silent();
        let result = verify_citation(
            Pending::new(0, citation(Some("Learning to Rank"), &["smith", "doe"], Some(2015))),
            &fx.ctx(&progress),
            &ScoringWeights::default(),
            0.75,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.status, MatchStatus::Verified);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.reason, None);
        assert_eq!(result.best_candidate.unwrap().title, "Learning to Rank");
    }

    #[tokio::test]
    async fn missing_title_never_queries() {
        let source = Arc::new(MockSource::new("Mock").with_default(MockResponse::found("X")));
        let fx = Fixture::new(vec![source.clone()]);
        let progress = silent();
        let result = verify_citation(
            Pending::new(0, citation(None, &["smith"], Some(2015))),
            &fx.ctx(&progress),
            &ScoringWeights::default(),
            0.75,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.status, MatchStatus::Unverified);
        assert_eq!(result.score, 0.0);
        assert!(result.best_candidate.is_none());
        assert_eq!(result.reason, Some(UnverifiedReason::NoTitle));
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_query() {
        let source = Arc::new(MockSource::new("Mock").with_default(MockResponse::found("X")));
        let fx = Fixture::new(vec![source.clone()]);
        let progress = silent();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = verify_citation(
            Pending::new(0, citation(Some("x"), &[], None)),
            &fx.ctx(&progress),
            &ScoringWeights::default(),
            0.75,
            &cancel,
        )
        .await;
        assert_eq!(result.reason, Some(UnverifiedReason::Cancelled));
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn no_candidates_is_unverified() {
        let source = Arc::new(MockSource::new("Mock"));
        let fx = Fixture::new(vec![source]);
        let progress = silent();
        let result = verify_citation(
            Pending::new(0, citation(Some("unknown paper"), &[], None)),
            &fx.ctx(&progress),
            &ScoringWeights::default(),
            0.75,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.reason, Some(UnverifiedReason::NoCandidates));
        assert_eq!(result.score, 0.0);
    }

    #[tokio::test]
    async fn below_threshold_keeps_candidate() {
        let source = Arc::new(MockSource::new("Mock").with_default(MockResponse::Found(vec![
            MockSource::candidate("A Completely Different Study", &["Roe"], Some(1990)),
        ])));
        let fx = Fixture::new(vec![source]);
        let progress = silent();
        let result = verify_citation(
            Pending::new(0, citation(Some("Learning to Rank"), &["smith"], Some(2015))),
            &fx.ctx(&progress),
            &ScoringWeights::default(),
            0.75,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.status, MatchStatus::Unverified);
        assert_eq!(result.reason, Some(UnverifiedReason::BelowThreshold));
        assert!(result.best_candidate.is_some());
        assert!(result.score > 0.0 && result.score < 0.75);
    }

    #[tokio::test(start_paused = true)]
    async fn all_sources_failing_is_lookup_failed() {
        let failing = || {
            Arc::new(
                MockSource::new("Down")
                    .with_default(MockResponse::Error(LookupError::Http { status: 503 })),
            )
        };
        let a = failing();
        let fx = Fixture::new(vec![a.clone(), failing()]);
        let events = std::sync::Mutex::new(Vec::new());
        let progress = |e: ProgressEvent| events.lock().unwrap().push(e);
        let result = verify_citation(
            Pending::new(7, citation(Some("learning to rank"), &[], None)),
            &fx.ctx(&progress),
            &ScoringWeights::default(),
            0.75,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.score, 0.0);
        assert!(result.best_candidate.is_none());
        match result.reason {
            Some(UnverifiedReason::LookupFailed { message }) => assert!(message.contains("503")),
            other => panic!("expected LookupFailed, got {:?}", other),
        }
        assert_eq!(a.call_count(), 4);
        let events = events.lock().unwrap();
        let retries = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Retrying { index: 7, .. }))
            .count();
        assert_eq!(retries, 6);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProgressEvent::LookupFailed { index: 7, .. }))
        );
    }

    #[tokio::test]
    async fn one_failing_source_still_uses_the_other() {
        let down = Arc::new(
            MockSource::new("Down").with_default(MockResponse::Error(LookupError::Http { status: 404 })),
        );
        let up = Arc::new(MockSource::new("Up").with_default(MockResponse::Found(vec![
            MockSource::candidate("Learning to Rank", &["Smith"], Some(2015)),
        ])));
        let fx = Fixture::new(vec![down, up]);
        let progress = silent();
        let result = verify_citation(
            Pending::new(0, citation(Some("Learning to Rank"), &["smith"], Some(2015))),
            &fx.ctx(&progress),
            &ScoringWeights::default(),
            0.75,
            &CancellationToken::new(),
        )
        .await;
        assert!(result.is_verified());
        assert_eq!(result.best_candidate.unwrap().source, "Up");
    }

    #[tokio::test]
    async fn each_source_keeps_its_closest_match() {
        let crossref = Arc::new(MockSource::new("CrossRef").with_default(MockResponse::Found(vec![
            MockSource::candidate("Learning to Rank", &["Smith"], Some(2015)),
        ])));
        let arxiv = Arc::new(MockSource::new("arXiv").with_default(MockResponse::Found(vec![
            MockSource::candidate("Unrelated Survey of Things", &["Roe"], Some(1999)),
            MockSource::candidate("Learning to Rank Fast", &["Smith"], Some(2015)),
        ])));
        let fx = Fixture::new(vec![crossref, arxiv]);
        let progress = silent();
        let result = verify_citation(
            Pending::new(0, citation(Some("Learning to Rank"), &["smith"], Some(2015))),
            &fx.ctx(&progress),
            &ScoringWeights::default(),
            0.75,
            &CancellationToken::new(),
        )
        .await;
        assert!(result.is_verified());
        let sources: Vec<&str> = result.per_source.iter().map(|m| m.source.as_str()).collect();
        assert_eq!(sources, vec!["CrossRef", "arXiv"]);
        assert_eq!(result.per_source[0].score, 1.0);
        assert_eq!(result.per_source[1].candidate.title, "Learning to Rank Fast");
        assert!(result.per_source[1].score < result.per_source[0].score);
    }

    #[tokio::test]
    async fn cache_short_circuits_second_lookup() {
        let source = Arc::new(MockSource::new("Mock").with_default(MockResponse::found("A Paper")));
        let fx = Fixture::new(vec![source.clone()]);
        let cache = QueryCache::default();
        let progress = silent();
        let mut ctx = fx.ctx(&progress);
        ctx.cache = Some(&cache);
        for _ in 0..2 {
            let pending = Pending::new(0, citation(Some("A Paper"), &[], None));
            let _ = pending.query(&ctx, &CancellationToken::new()).await;
        }
        assert_eq!(source.call_count(), 1);
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn ties_prefer_year_match_then_earlier() {
        let c = citation(Some("graph networks"), &[], Some(2018));
        let weights = ScoringWeights {
            title: 1.0,
            authors: 0.0,
            year: 0.0,
        };
        let candidates = vec![
            MockSource::candidate("Graph Networks", &[], Some(2001)),
            MockSource::candidate("Graph Networks", &[], Some(2018)),
            MockSource::candidate("Graph Networks", &[], Some(2018)),
        ];
        let (i, _, score) = select_best(&c, &candidates, &weights).unwrap();
        assert_eq!(i, 1);
        assert_eq!(score, 1.0);

        let no_year = vec![
            MockSource::candidate("Graph Networks", &[], None),
            MockSource::candidate("Graph Networks", &[], None),
        ];
        let (i, _, _) = select_best(&c, &no_year, &weights).unwrap();
        assert_eq!(i, 0);
    }

    #[test]
    fn higher_score_beats_year_match() {
        let c = citation(Some("graph networks"), &[], Some(2018));
        let candidates = vec![
            MockSource::candidate("Graph Network Models", &[], Some(2018)),
            MockSource::candidate("Graph Networks", &[], Some(1990)),
        ];
        // 0.6 * ratio("graph networks", "graph network models") + 0.1 is about 0.594
        let (i, _, _) = select_best(&c, &candidates, &ScoringWeights::default()).unwrap();
        assert_eq!(i, 1);
    }
}
