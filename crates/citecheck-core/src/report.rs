use serde::{Deserialize, Serialize};

use crate::{MatchResult, MatchStatus, UnverifiedReason};

/// Verification outcome for a whole document.
///
/// Every input citation appears in exactly one of the two lists, and each
/// list keeps the input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub verified: Vec<MatchResult>,
    pub unverified: Vec<MatchResult>,
}

/// Counts for the terminal summary and the JSON header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub verified: usize,
    pub unverified: usize,
    /// Citations whose title could not be parsed.
    pub low_confidence: usize,
    pub lookup_failures: usize,
    pub cancelled: usize,
}

impl Report {
    pub fn summary(&self) -> ReportSummary {
        let count_reason = |pred: fn(&UnverifiedReason) -> bool| {
            self.unverified
                .iter()
                .filter(|r| r.reason.as_ref().is_some_and(pred))
                .count()
        };
        ReportSummary {
            total: self.len(),
            verified: self.verified.len(),
            unverified: self.unverified.len(),
            low_confidence: self
                .verified
                .iter()
                .chain(&self.unverified)
                .filter(|r| r.citation.low_confidence)
                .count(),
            lookup_failures: count_reason(|r| matches!(r, UnverifiedReason::LookupFailed { .. })),
            cancelled: count_reason(|r| matches!(r, UnverifiedReason::Cancelled)),
        }
    }

    pub fn len(&self) -> usize {
        self.verified.len() + self.unverified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition results by status, preserving their order.
pub fn assemble(results: Vec<MatchResult>) -> Report {
    let (verified, unverified) = results
        .into_iter()
        .partition(|r| r.status == MatchStatus::Verified);
    Report {
        verified,
        unverified,
    }
}
