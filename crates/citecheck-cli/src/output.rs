use std::io::Write;

use citecheck_core::{MatchResult, ParsedCitation, ProgressEvent, Report, UnverifiedReason};
use owo_colors::OwoColorize;
use serde::Serialize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Shorten to `max` characters, appending `...` when cut.
fn shorten(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

fn reason_text(reason: &UnverifiedReason) -> String {
    match reason {
        UnverifiedReason::NoTitle => "no title parsed".to_string(),
        UnverifiedReason::LookupFailed { message } => format!("lookup failed: {}", message),
        UnverifiedReason::NoCandidates => "no candidates found".to_string(),
        UnverifiedReason::BelowThreshold => "best candidate below threshold".to_string(),
        UnverifiedReason::Cancelled => "cancelled".to_string(),
    }
}

/// Print the extraction summary after parsing.
pub fn print_extraction_summary(
    w: &mut dyn Write,
    file_name: &str,
    citations: &[ParsedCitation],
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "Extracting citations from {}...", file_name)?;
    writeln!(w, "Found {} citations to check", citations.len())?;

    let untitled = citations.iter().filter(|c| c.low_confidence).count();
    if untitled > 0 {
        let msg = format!("({} without a parsable title will not be looked up)", untitled);
        if color.enabled() {
            writeln!(w, "{}", msg.dimmed())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::Checking {
            index,
            total,
            title,
        } => {
            writeln!(w, "[{}/{}] Checking: \"{}\"", index + 1, total, shorten(title, 50))?;
        }
        ProgressEvent::Result {
            index,
            total,
            result,
        } => {
            let idx = index + 1;
            if result.is_verified() {
                let source = result
                    .best_candidate
                    .as_ref()
                    .map(|c| c.source.as_str())
                    .unwrap_or("unknown");
                if color.enabled() {
                    writeln!(
                        w,
                        "[{}/{}] -> {} ({}, score {:.2})",
                        idx,
                        total,
                        "VERIFIED".green(),
                        source,
                        result.score
                    )?;
                } else {
                    writeln!(
                        w,
                        "[{}/{}] -> VERIFIED ({}, score {:.2})",
                        idx, total, source, result.score
                    )?;
                }
            } else {
                let why = result
                    .reason
                    .as_ref()
                    .map(reason_text)
                    .unwrap_or_default();
                if color.enabled() {
                    writeln!(w, "[{}/{}] -> {} ({})", idx, total, "UNVERIFIED".red(), why)?;
                } else {
                    writeln!(w, "[{}/{}] -> UNVERIFIED ({})", idx, total, why)?;
                }
            }
        }
        ProgressEvent::Retrying {
            index,
            source,
            attempt,
            backoff,
        } => {
            let msg = format!(
                "[{}] {} failed, retry {} in {:?}",
                index + 1,
                source,
                attempt,
                backoff
            );
            if color.enabled() {
                writeln!(w, "{}", msg.dimmed())?;
            } else {
                writeln!(w, "{}", msg)?;
            }
        }
        ProgressEvent::LookupFailed {
            index,
            source,
            message,
        } => {
            if color.enabled() {
                writeln!(w, "{} [{}] {}: {}", "WARNING:".yellow(), index + 1, source, message)?;
            } else {
                writeln!(w, "WARNING: [{}] {}: {}", index + 1, source, message)?;
            }
        }
    }
    Ok(())
}

fn print_unverified_entry(
    w: &mut dyn Write,
    result: &MatchResult,
    color: ColorMode,
) -> std::io::Result<()> {
    let citation = &result.citation;
    let title = citation.title.as_deref().unwrap_or("(no title)");
    if color.enabled() {
        writeln!(w, "{}", title.bold())?;
    } else {
        writeln!(w, "{}", title)?;
    }
    if !citation.authors.is_empty() {
        writeln!(w, "  Authors: {}", citation.authors.join("; "))?;
    }
    if let Some(year) = citation.year {
        writeln!(w, "  Year:    {}", year)?;
    }
    if let Some(reason) = &result.reason {
        writeln!(w, "  Reason:  {}", reason_text(reason))?;
    }
    if let Some(best) = &result.best_candidate {
        writeln!(
            w,
            "  Closest: \"{}\" ({}, score {:.2})",
            shorten(&best.title, 80),
            best.source,
            result.score
        )?;
    }
    if result.per_source.len() > 1 {
        for m in &result.per_source {
            writeln!(
                w,
                "    {}: \"{}\" (score {:.2})",
                m.source,
                shorten(&m.candidate.title, 60),
                m.score
            )?;
        }
    }
    let raw = shorten(&citation.raw_text, 200);
    if color.enabled() {
        writeln!(w, "  Raw:     {}", raw.dimmed())?;
    } else {
        writeln!(w, "  Raw:     {}", raw)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print every unverified citation with its reason and closest candidate.
pub fn print_unverified_report(
    w: &mut dyn Write,
    report: &Report,
    color: ColorMode,
) -> std::io::Result<()> {
    if report.unverified.is_empty() {
        return Ok(());
    }
    let header = "UNVERIFIED CITATIONS";
    if color.enabled() {
        writeln!(w, "{}", header.bold().red())?;
    } else {
        writeln!(w, "{}", header)?;
    }
    writeln!(w, "{}", "=".repeat(header.len()))?;
    writeln!(w)?;
    for result in &report.unverified {
        print_unverified_entry(w, result, color)?;
    }
    Ok(())
}

/// Print the final summary counts.
pub fn print_summary(w: &mut dyn Write, report: &Report, color: ColorMode) -> std::io::Result<()> {
    let summary = report.summary();
    writeln!(w, "SUMMARY")?;
    writeln!(w, "  Total:            {}", summary.total)?;
    if color.enabled() {
        writeln!(w, "  Verified:         {}", summary.verified.to_string().green())?;
        writeln!(w, "  Unverified:       {}", summary.unverified.to_string().red())?;
    } else {
        writeln!(w, "  Verified:         {}", summary.verified)?;
        writeln!(w, "  Unverified:       {}", summary.unverified)?;
    }
    if summary.low_confidence > 0 {
        writeln!(w, "  No title parsed:  {}", summary.low_confidence)?;
    }
    if summary.lookup_failures > 0 {
        writeln!(w, "  Lookup failures:  {}", summary.lookup_failures)?;
    }
    if summary.cancelled > 0 {
        if color.enabled() {
            writeln!(w, "  Cancelled:        {}", summary.cancelled.to_string().yellow())?;
        } else {
            writeln!(w, "  Cancelled:        {}", summary.cancelled)?;
        }
    }
    Ok(())
}

/// JSON document written to `--out`.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub file: &'a str,
    pub threshold: f64,
    pub summary: citecheck_core::ReportSummary,
    pub verified: &'a [MatchResult],
    pub unverified: &'a [MatchResult],
}

impl<'a> JsonReport<'a> {
    pub fn new(file: &'a str, threshold: f64, report: &'a Report) -> Self {
        Self {
            file,
            threshold,
            summary: report.summary(),
            verified: &report.verified,
            unverified: &report.unverified,
        }
    }
}

/// Serialize the report as pretty-printed JSON.
pub fn write_json_report(
    w: &mut dyn Write,
    file: &str,
    threshold: f64,
    report: &Report,
) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *w, &JsonReport::new(file, threshold, report))?;
    writeln!(w)?;
    Ok(())
}
