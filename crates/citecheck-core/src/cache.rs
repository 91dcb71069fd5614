//! In-memory cache for metadata source lookups.
//!
//! Keys are (normalized title, source name, candidate limit), so the same
//! reference cited twice, or re-checked in a later run within the same
//! process, is not looked up again. Only successful lookups are cached;
//! errors are never stored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::CandidateRecord;
use crate::normalize::normalize_title;

/// Default time-to-live for lookups that returned candidates: 7 days.
pub const DEFAULT_POSITIVE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default time-to-live for lookups that returned nothing: 24 hours.
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Hash, Eq, PartialEq, Clone, Debug)]
struct CacheKey {
    normalized_title: String,
    source: String,
    limit: usize,
}

#[derive(Clone, Debug)]
struct CacheEntry {
    candidates: Vec<CandidateRecord>,
    inserted_at: Instant,
}

/// Thread-safe lookup cache shared by all workers.
pub struct QueryCache {
    entries: DashMap<CacheKey, CacheEntry>,
    positive_ttl: Duration,
    negative_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_POSITIVE_TTL, DEFAULT_NEGATIVE_TTL)
    }
}

impl QueryCache {
    pub fn new(positive_ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            positive_ttl,
            negative_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(title: &str, source: &str, limit: usize) -> CacheKey {
        CacheKey {
            normalized_title: normalize_title(title),
            source: source.to_string(),
            limit,
        }
    }

    /// Cached candidates for this lookup, if present and within TTL.
    pub fn get(&self, title: &str, source: &str, limit: usize) -> Option<Vec<CandidateRecord>> {
        let key = Self::key(title, source, limit);

        if let Some(entry) = self.entries.get(&key) {
            let ttl = if entry.candidates.is_empty() {
                self.negative_ttl
            } else {
                self.positive_ttl
            };
            if entry.inserted_at.elapsed() <= ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(source, title, "cache hit");
                return Some(entry.candidates.clone());
            }
            drop(entry);
            self.entries.remove(&key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a successful lookup. Empty results are skipped when the negative TTL is zero.
    pub fn insert(&self, title: &str, source: &str, limit: usize, candidates: &[CandidateRecord]) {
        if candidates.is_empty() && self.negative_ttl.is_zero() {
            return;
        }
        tracing::trace!(source, title, found = candidates.len(), "cache insert");
        self.entries.insert(
            Self::key(title, source, limit),
            CacheEntry {
                candidates: candidates.to_vec(),
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn positive_ttl(&self) -> Duration {
        self.positive_ttl
    }

    pub fn negative_ttl(&self) -> Duration {
        self.negative_ttl
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.entries.len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .field("positive_ttl", &self.positive_ttl)
            .field("negative_ttl", &self.negative_ttl)
            .finish()
    }
}
