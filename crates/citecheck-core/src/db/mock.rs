//! Mock metadata source for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{MetadataSource, SearchFuture};
use crate::CandidateRecord;
use crate::rate_limit::LookupError;

/// A configurable mock response for [`MockSource`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return these candidates.
    Found(Vec<CandidateRecord>),
    /// Source answered but found nothing.
    Empty,
    /// Fail with this error.
    Error(LookupError),
}

impl MockResponse {
    /// A single candidate with the given title and no authors or year.
    pub fn found(title: &str) -> Self {
        MockResponse::Found(vec![MockSource::candidate(title, &[], None)])
    }
}

/// A hand-rolled mock implementing [`MetadataSource`] for tests.
///
/// Response selection per call:
/// 1. the next entry of the sequence, if any remain;
/// 2. a response registered for the exact (normalized) title;
/// 3. the default response ([`MockResponse::Empty`] unless set).
pub struct MockSource {
    name: String,
    /// Reversed so `pop()` yields the next response.
    sequence: Mutex<Vec<MockResponse>>,
    by_title: HashMap<String, MockResponse>,
    default: MockResponse,
    delay: Option<Duration>,
    delays_by_title: HashMap<String, Duration>,
    call_count: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequence: Mutex::new(Vec::new()),
            by_title: HashMap::new(),
            default: MockResponse::Empty,
            delay: None,
            delays_by_title: HashMap::new(),
            call_count: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Response used when nothing more specific applies.
    pub fn with_default(mut self, response: MockResponse) -> Self {
        self.default = response;
        self
    }

    /// Respond to this title with `response`.
    pub fn with_response(mut self, title: &str, response: MockResponse) -> Self {
        self.by_title.insert(title.to_string(), response);
        self
    }

    /// Responses consumed one per call before any other rule applies.
    pub fn with_sequence(self, mut responses: Vec<MockResponse>) -> Self {
        responses.reverse();
        if let Ok(mut seq) = self.sequence.lock() {
            *seq = responses;
        }
        self
    }

    /// Simulated latency for every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Simulated latency for one title, overriding [`with_delay`](Self::with_delay).
    pub fn with_delay_for(mut self, title: &str, delay: Duration) -> Self {
        self.delays_by_title.insert(title.to_string(), delay);
        self
    }

    /// How many times `search_by_title()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Titles queried so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    /// Convenience constructor for candidate records in tests.
    pub fn candidate(title: &str, authors: &[&str], year: Option<i32>) -> CandidateRecord {
        CandidateRecord {
            title: title.to_string(),
            authors: authors.iter().map(|a| a.to_string()).collect(),
            year,
            source_id: format!("mock:{}", title),
            source: "Mock".to_string(),
            extra: BTreeMap::new(),
        }
    }

    fn next_response(&self, title: &str) -> MockResponse {
        if let Some(resp) = self.sequence.lock().ok().and_then(|mut seq| seq.pop()) {
            return resp;
        }
        self.by_title
            .get(title)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

impl MetadataSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn search_by_title<'a>(
        &'a self,
        title: &'a str,
        limit: usize,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> SearchFuture<'a> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut q) = self.queries.lock() {
            q.push(title.to_string());
        }
        let response = self.next_response(title);
        let delay = self.delays_by_title.get(title).copied().or(self.delay);

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match response {
                MockResponse::Found(mut candidates) => {
                    candidates.truncate(limit);
                    for c in &mut candidates {
                        c.source = self.name.clone();
                    }
                    Ok(candidates)
                }
                MockResponse::Empty => Ok(Vec::new()),
                MockResponse::Error(e) => Err(e),
            }
        })
    }
}
