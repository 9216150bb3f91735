//! Output module for the crawl report and its summaries
//!
//! This module handles:
//! - The report data model handed to downstream analysis
//! - JSON export and import of reports
//! - Crawl statistics for the CLI summary

mod report;
pub mod stats;

pub use report::{CrawlReport, PageRecord, SkipReason, SkippedUrl, StopReason};
pub use stats::{print_statistics, CrawlStatistics};

/// Prints the summary of a finished crawl to stdout
pub fn print_summary(report: &CrawlReport) {
    print_statistics(&CrawlStatistics::from_report(report));
}
