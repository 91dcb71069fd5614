//! Integration tests for the verification pool and the checker.
//!
//! Every test runs against [`MockSource`] with rate limiting disabled, so no
//! HTTP requests are made. Timing-dependent tests run with paused time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use citecheck_core::checker::{check_citations_with_sources, verify_citations};
use citecheck_core::db::mock::{MockResponse, MockSource};
use citecheck_core::normalize::normalize_title;
use citecheck_core::pool::{CitationJob, ValidationPool};
use citecheck_core::{
    Config, LookupError, MatchStatus, MetadataSource, ParsedCitation, ProgressEvent,
    RateLimiters, RetryPolicy, UnverifiedReason,
};
use tokio_util::sync::CancellationToken;

fn config_no_network() -> Config {
    Config {
        rate_limiters: Arc::new(RateLimiters::unlimited()),
        query_cache: None,
        num_workers: 4,
        retry: RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        },
        ..Config::default()
    }
}

fn citation(title: &str, authors: &[&str], year: Option<i32>) -> ParsedCitation {
    ParsedCitation::new(
        format!("{}. {}.", authors.join(", "), title),
        authors.iter().map(|a| a.to_string()).collect(),
        Some(normalize_title(title)),
        year,
    )
}

fn dyn_source(mock: &Arc<MockSource>) -> Arc<dyn MetadataSource> {
    mock.clone()
}

#[tokio::test]
async fn single_job_completes() {
    let mock = Arc::new(MockSource::new("Mock").with_default(MockResponse::found("A Test Paper")));
    let pool = ValidationPool::new(
        Arc::new(config_no_network()),
        vec![dyn_source(&mock)],
        CancellationToken::new(),
    );

    let (tx, rx) = tokio::sync::oneshot::channel();
    pool.submit(CitationJob {
        citation: citation("A Test Paper", &[], None),
        index: 0,
        total: 1,
        result_tx: tx,
        progress: Arc::new(|_| {}),
    })
    .await;
    let result = rx.await.expect("should receive result");
    pool.shutdown().await;

    // Title-only match: 0.6 of the weight, below the 0.75 threshold
    assert_eq!(result.status, MatchStatus::Unverified);
    assert_eq!(result.reason, Some(UnverifiedReason::BelowThreshold));
    assert_eq!(
        result.best_candidate.map(|c| c.title),
        Some("A Test Paper".to_string())
    );
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn order_preserved_under_uneven_latency() {
    let total = 24;
    let mut mock = MockSource::new("Mock");
    for i in 0..total {
        let title = format!("paper number {i}");
        let delay = Duration::from_millis(fastrand::u64(1..500));
        mock = mock
            .with_delay_for(&title, delay)
            .with_response(&title, MockResponse::Found(vec![MockSource::candidate(
                &format!("Paper Number {i}"),
                &["Ada Lovelace"],
                Some(2000 + i as i32),
            )]));
    }
    let mock = Arc::new(mock);

    let citations: Vec<_> = (0..total)
        .map(|i| citation(&format!("Paper Number {i}"), &["lovelace"], Some(2000 + i as i32)))
        .collect();
    let results = verify_citations(
        citations,
        Arc::new(config_no_network()),
        vec![dyn_source(&mock)],
        Arc::new(|_: ProgressEvent| {}),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(results.len(), total);
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.citation.title.as_deref(), Some(format!("paper number {i}").as_str()));
        assert_eq!(r.status, MatchStatus::Verified, "citation {i}");
        assert_eq!(r.score, 1.0);
    }
}

#[tokio::test]
async fn every_citation_lands_in_exactly_one_list() {
    let mock = Arc::new(
        MockSource::new("Mock")
            .with_response(
                "attention is all you need",
                MockResponse::Found(vec![MockSource::candidate(
                    "Attention Is All You Need",
                    &["Ashish Vaswani", "Noam Shazeer"],
                    Some(2017),
                )]),
            )
            .with_response("unknown work", MockResponse::Empty),
    );
    let citations = vec![
        citation("Attention Is All You Need", &["vaswani", "shazeer"], Some(2017)),
        citation("Unknown Work", &["nobody"], Some(1999)),
        ParsedCitation::new("Garbled entry without a title", vec![], None, None),
    ];

    let report = check_citations_with_sources(
        citations,
        config_no_network(),
        vec![dyn_source(&mock)],
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report.verified.len(), 1);
    assert_eq!(report.unverified.len(), 2);
    assert_eq!(report.unverified[0].reason, Some(UnverifiedReason::NoCandidates));
    assert_eq!(report.unverified[1].reason, Some(UnverifiedReason::NoTitle));
    // The untitled citation never reaches a source
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn exact_match_scores_one() {
    let mock = Arc::new(MockSource::new("Mock").with_default(MockResponse::Found(vec![
        MockSource::candidate("Learning to Rank", &["John Smith", "Alice Doe"], Some(2015)),
    ])));
    let report = check_citations_with_sources(
        vec![citation("Learning to Rank", &["smith", "doe"], Some(2015))],
        config_no_network(),
        vec![dyn_source(&mock)],
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.verified.len(), 1);
    let r = &report.verified[0];
    assert_eq!(r.score, 1.0);
    assert!(r.reason.is_none());
    assert_eq!(r.best_candidate.as_ref().map(|c| c.source.as_str()), Some("Mock"));
}

#[tokio::test]
async fn near_title_still_verifies() {
    let mock = Arc::new(MockSource::new("Mock").with_default(MockResponse::Found(vec![
        MockSource::candidate("Learning to Ranking", &["John Smith", "Alice Doe"], Some(2015)),
    ])));
    let report = check_citations_with_sources(
        vec![citation("Learning to Rank", &["smith", "doe"], Some(2015))],
        config_no_network(),
        vec![dyn_source(&mock)],
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.verified.len(), 1);
    let score = report.verified[0].score;
    assert!(score > 0.75 && score < 1.0, "score {score}");
}

#[tokio::test]
async fn unrelated_candidate_kept_but_unverified() {
    let mock = Arc::new(MockSource::new("Mock").with_default(MockResponse::Found(vec![
        MockSource::candidate("Deep Residual Networks for Images", &["Kaiming He"], Some(2016)),
    ])));
    let report = check_citations_with_sources(
        vec![citation("Learning to Rank", &["smith"], Some(2005))],
        config_no_network(),
        vec![dyn_source(&mock)],
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(report.verified.is_empty());
    let r = &report.unverified[0];
    assert_eq!(r.reason, Some(UnverifiedReason::BelowThreshold));
    assert!(r.best_candidate.is_some());
    assert!(r.score < 0.75);
}

#[tokio::test(start_paused = true)]
async fn failing_lookup_is_retried_then_reported() {
    let mock = Arc::new(
        MockSource::new("Mock")
            .with_default(MockResponse::Error(LookupError::Http { status: 503 })),
    );
    let config = Config {
        num_workers: 1,
        retry: RetryPolicy {
            max_retries: 2,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            jitter: false,
        },
        ..config_no_network()
    };

    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    let report = check_citations_with_sources(
        vec![citation("Some Paper", &["smith"], Some(2020))],
        config,
        vec![dyn_source(&mock)],
        move |e| events_clone.lock().unwrap().push(e),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(mock.call_count(), 3);
    let r = &report.unverified[0];
    match &r.reason {
        Some(UnverifiedReason::LookupFailed { message }) => {
            assert!(message.contains("Mock"), "{message}");
            assert!(message.contains("503"), "{message}");
        }
        other => panic!("expected LookupFailed, got {other:?}"),
    }
    assert_eq!(report.summary().lookup_failures, 1);

    let events = events.lock().unwrap();
    let backoffs: Vec<Duration> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Retrying { backoff, .. } => Some(*backoff),
            _ => None,
        })
        .collect();
    assert_eq!(
        backoffs,
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ProgressEvent::LookupFailed { .. }))
    );
}

#[tokio::test]
async fn one_failing_source_does_not_fail_the_citation() {
    let broken = Arc::new(
        MockSource::new("Broken").with_default(MockResponse::Error(LookupError::Http { status: 404 })),
    );
    let working = Arc::new(MockSource::new("Working").with_default(MockResponse::Found(vec![
        MockSource::candidate("Some Paper", &["Jane Smith"], Some(2020)),
    ])));
    let report = check_citations_with_sources(
        vec![citation("Some Paper", &["smith"], Some(2020))],
        config_no_network(),
        vec![dyn_source(&broken), dyn_source(&working)],
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.verified.len(), 1);
    // 404 is not transient: no retries
    assert_eq!(broken.call_count(), 1);
}

#[tokio::test]
async fn cancelled_before_start_marks_everything_cancelled() {
    let mock = Arc::new(MockSource::new("Mock").with_default(MockResponse::found("X")));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = check_citations_with_sources(
        vec![
            citation("First", &[], None),
            citation("Second", &[], None),
            ParsedCitation::new("no title here", vec![], None, None),
        ],
        config_no_network(),
        vec![dyn_source(&mock)],
        |_| {},
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report.summary().cancelled, 2);
    assert_eq!(report.unverified[2].reason, Some(UnverifiedReason::NoTitle));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_run_finishes_in_flight_work() {
    let mock = Arc::new(
        MockSource::new("Mock")
            .with_default(MockResponse::Empty)
            .with_delay(Duration::from_secs(10)),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let results = verify_citations(
        vec![
            citation("One", &[], None),
            citation("Two", &[], None),
            citation("Three", &[], None),
        ],
        Arc::new(Config {
            num_workers: 1,
            ..config_no_network()
        }),
        vec![dyn_source(&mock)],
        Arc::new(|_: ProgressEvent| {}),
        cancel,
    )
    .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].reason, Some(UnverifiedReason::NoCandidates));
    assert_eq!(results[1].reason, Some(UnverifiedReason::Cancelled));
    assert_eq!(results[2].reason, Some(UnverifiedReason::Cancelled));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn progress_reports_each_citation_once() {
    let mock = Arc::new(MockSource::new("Mock"));
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();

    let total = 6;
    let citations = (0..total).map(|i| citation(&format!("Paper {i}"), &[], None)).collect();
    verify_citations(
        citations,
        Arc::new(config_no_network()),
        vec![dyn_source(&mock)],
        Arc::new(move |e: ProgressEvent| events_clone.lock().unwrap().push(e)),
        CancellationToken::new(),
    )
    .await;

    let events = events.lock().unwrap();
    let mut checking: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Checking { index, total: t, .. } => {
                assert_eq!(*t, total);
                Some(*index)
            }
            _ => None,
        })
        .collect();
    let mut finished: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Result { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    checking.sort_unstable();
    finished.sort_unstable();
    assert_eq!(checking, (0..total).collect::<Vec<_>>());
    assert_eq!(finished, (0..total).collect::<Vec<_>>());
}
