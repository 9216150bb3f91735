//! Crawl statistics derived from a finished report
//!
//! This module provides the summary printed by the CLI after a crawl.

use crate::crawler::FetchStrategy;
use crate::output::{CrawlReport, SkipReason, StopReason};
use std::collections::BTreeMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Number of page records produced
    pub pages: usize,

    /// URLs for which a fetch was attempted
    pub pages_fetched: usize,

    /// Skip entries by reason
    pub skips_by_reason: BTreeMap<SkipReason, usize>,

    /// Page records by fetch strategy
    pub pages_by_strategy: BTreeMap<FetchStrategy, usize>,

    /// Total words across all page records
    pub total_words: usize,

    /// Total outbound links across all page records
    pub total_links: usize,

    pub duration_seconds: f64,
    pub stop_reason: StopReason,
}

impl CrawlStatistics {
    /// Computes statistics from a report
    pub fn from_report(report: &CrawlReport) -> Self {
        Self {
            pages: report.pages.len(),
            pages_fetched: report.pages_fetched,
            skips_by_reason: report.skip_counts(),
            pages_by_strategy: report.strategy_counts(),
            total_words: report.pages.iter().map(|p| p.word_count).sum(),
            total_links: report.pages.iter().map(|p| p.links.len()).sum(),
            duration_seconds: report.duration().num_milliseconds() as f64 / 1000.0,
            stop_reason: report.stop_reason,
        }
    }

    pub fn total_skipped(&self) -> usize {
        self.skips_by_reason.values().sum()
    }

    /// Discovered links the frontier refused (off-site or too deep)
    pub fn rejected_links(&self) -> usize {
        self.skips_by_reason
            .iter()
            .filter(|(reason, _)| reason.is_rejection())
            .map(|(_, count)| count)
            .sum()
    }

    /// Share of fetch attempts that produced a page record, in percent
    pub fn success_rate(&self) -> f64 {
        if self.pages_fetched > 0 {
            (self.pages as f64 / self.pages_fetched as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Summary ===\n");

    println!("Overview:");
    println!("  Pages recorded: {}", stats.pages);
    println!("  Fetches attempted: {}", stats.pages_fetched);
    println!("  URLs skipped: {}", stats.total_skipped());
    println!("  Links rejected: {}", stats.rejected_links());
    println!("  Words extracted: {}", stats.total_words);
    println!("  Links found: {}", stats.total_links);
    println!("  Duration: {:.1}s", stats.duration_seconds);
    println!("  Stopped: {}", stats.stop_reason);
    println!();

    if !stats.pages_by_strategy.is_empty() {
        println!("Pages by Strategy:");
        for (strategy, count) in &stats.pages_by_strategy {
            println!("  {}: {}", strategy.as_str(), count);
        }
        println!();
    }

    if !stats.skips_by_reason.is_empty() {
        println!("Skips by Reason:");
        // Sort reasons by count (descending)
        let mut reason_counts: Vec<_> = stats.skips_by_reason.iter().collect();
        reason_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (reason, count) in reason_counts {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} fetched pages recorded)",
        stats.success_rate(),
        stats.pages,
        stats.pages_fetched
    );
}
