use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::db::{MetadataSource, build_sources};
use crate::pool::{CitationJob, ValidationPool};
use crate::report::{Report, assemble};
use crate::{Config, ConfigError, MatchResult, ParsedCitation, ProgressEvent, UnverifiedReason};

/// Verify citations against the given sources.
///
/// Creates an internal ValidationPool, submits every citation, and collects
/// the results into a slot array by index. The returned vector has exactly
/// one result per input citation, in input order, whatever order the
/// workers finished in.
pub async fn verify_citations(
    citations: Vec<ParsedCitation>,
    config: Arc<Config>,
    sources: Vec<Arc<dyn MetadataSource>>,
    progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
    cancel: CancellationToken,
) -> Vec<MatchResult> {
    let total = citations.len();
    if total == 0 {
        return vec![];
    }

    let pool = ValidationPool::new(config, sources, cancel);

    let mut receivers = Vec::with_capacity(total);
    for (index, citation) in citations.iter().enumerate() {
        let (result_tx, result_rx) = tokio::sync::oneshot::channel();
        pool.submit(CitationJob {
            citation: citation.clone(),
            index,
            total,
            result_tx,
            progress: progress.clone(),
        })
        .await;
        receivers.push((index, result_rx));
    }

    let mut slots: Vec<Option<MatchResult>> = vec![None; total];
    for (index, rx) in receivers {
        if let Ok(result) = rx.await {
            slots[index] = Some(result);
        }
    }

    pool.shutdown().await;

    // A slot is only empty if its worker died; keep the partition total anyway
    slots
        .into_iter()
        .zip(citations)
        .map(|(slot, citation)| {
            slot.unwrap_or_else(|| {
                tracing::warn!("worker ended without a result");
                MatchResult::unmatched(
                    citation,
                    UnverifiedReason::LookupFailed {
                        message: "worker ended without a result".into(),
                    },
                )
            })
        })
        .collect()
}

/// Validate the config, verify every citation against the configured
/// sources, and assemble the report.
pub async fn check_citations(
    citations: Vec<ParsedCitation>,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<Report, ConfigError> {
    config.validate()?;
    let sources = build_sources(&config);
    check_citations_with_sources(citations, config, sources, progress, cancel).await
}

/// Like [`check_citations`], with an explicit source list.
pub async fn check_citations_with_sources(
    citations: Vec<ParsedCitation>,
    config: Config,
    sources: Vec<Arc<dyn MetadataSource>>,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<Report, ConfigError> {
    config.validate()?;
    if sources.is_empty() {
        return Err(ConfigError::NoSources);
    }

    let total = citations.len();
    let results = verify_citations(
        citations,
        Arc::new(config),
        sources,
        Arc::new(progress),
        cancel,
    )
    .await;
    let report = assemble(results);

    let summary = report.summary();
    tracing::info!(
        total,
        verified = summary.verified,
        unverified = summary.unverified,
        lookup_failures = summary.lookup_failures,
        "verification finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::{MockResponse, MockSource};
    use crate::normalize::normalize_title;
    use crate::rate_limit::RateLimiters;
    use crate::{MatchStatus, ScoringWeights};

    fn citation(title: &str) -> ParsedCitation {
        ParsedCitation::new(title, vec![], Some(normalize_title(title)), None)
    }

    fn test_config() -> Config {
        Config {
            rate_limiters: Arc::new(RateLimiters::unlimited()),
            query_cache: None,
            weights: ScoringWeights {
                title: 1.0,
                authors: 0.0,
                year: 0.0,
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn empty_input_gives_empty_report() {
        let source: Arc<dyn MetadataSource> = Arc::new(MockSource::new("Mock"));
        let report = check_citations_with_sources(
            vec![],
            test_config(),
            vec![source],
            |_| {},
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(report.verified.is_empty());
        assert!(report.unverified.is_empty());
    }

    #[tokio::test]
    async fn invalid_config_rejected_before_lookup() {
        let mock = Arc::new(MockSource::new("Mock").with_default(MockResponse::found("A")));
        let config = Config {
            verify_threshold: 2.0,
            ..test_config()
        };
        let err = check_citations_with_sources(
            vec![citation("A")],
            config,
            vec![mock.clone() as Arc<dyn MetadataSource>],
            |_| {},
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err, ConfigError::Threshold(2.0));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn no_sources_rejected() {
        let err = check_citations_with_sources(
            vec![citation("A")],
            test_config(),
            vec![],
            |_| {},
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err, ConfigError::NoSources);
    }

    #[tokio::test]
    async fn results_come_back_in_input_order() {
        let mock: Arc<dyn MetadataSource> = Arc::new(
            MockSource::new("Mock")
                .with_response("first paper", MockResponse::found("First Paper"))
                .with_response("third paper", MockResponse::found("Third Paper")),
        );
        let results = verify_citations(
            vec![
                citation("First Paper"),
                citation("Second Paper"),
                citation("Third Paper"),
            ],
            Arc::new(test_config()),
            vec![mock],
            Arc::new(|_: ProgressEvent| {}),
            CancellationToken::new(),
        )
        .await;
        let statuses: Vec<MatchStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                MatchStatus::Verified,
                MatchStatus::Unverified,
                MatchStatus::Verified
            ]
        );
        assert_eq!(results[1].citation.raw_text, "Second Paper");
    }
}
