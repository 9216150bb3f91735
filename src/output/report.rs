//! Crawl report types
//!
//! The [`CrawlReport`] is the only artifact handed to downstream analysis.
//! Skip reason codes are stable strings and must not be renamed.

use crate::config::SeedRequest;
use crate::crawler::FetchStrategy;
use crate::CrawlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Why a URL did not produce a page record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    // ===== Popped from the frontier =====
    /// robots.txt disallows the URL for our user agent
    RobotsDisallowed,

    /// Fetch failed (after its retry, if transient)
    FetchError,

    /// Extracted text shorter than the minimum
    LowContent,

    /// Redirected to a URL that was already visited
    Duplicate,

    /// Still queued when the page budget ran out
    BudgetExhausted,

    // ===== Rejected by the frontier =====
    /// Not http(s), or outside the seed's registrable domain
    OutOfScope,

    /// Deeper than the maximum crawl depth
    DepthExceeded,
}

impl SkipReason {
    /// All reasons, in report order
    pub const ALL: [SkipReason; 7] = [
        Self::RobotsDisallowed,
        Self::FetchError,
        Self::LowContent,
        Self::Duplicate,
        Self::BudgetExhausted,
        Self::OutOfScope,
        Self::DepthExceeded,
    ];

    /// The stable reason code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RobotsDisallowed => "robots_disallowed",
            Self::FetchError => "fetch_error",
            Self::LowContent => "low_content",
            Self::Duplicate => "duplicate",
            Self::BudgetExhausted => "budget_exhausted",
            Self::OutOfScope => "out_of_scope",
            Self::DepthExceeded => "depth_exceeded",
        }
    }

    /// Parses a reason code. Returns None for unknown codes.
    pub fn from_code(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }

    /// True for reasons given to URLs the frontier never admitted
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::OutOfScope | Self::DepthExceeded)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why the crawl stopped dispatching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Nothing left to fetch
    FrontierExhausted,
    /// `max_pages` page records produced
    BudgetReached,
    /// External cancellation signal
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FrontierExhausted => "frontier exhausted",
            Self::BudgetReached => "page budget reached",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One normalized, analysis-ready page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Canonical URL taken from the frontier
    pub url: String,

    /// URL after redirects
    pub final_url: String,

    pub depth: u32,
    pub discovered_from: Option<String>,
    pub status: u16,

    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    /// h2 to h4 headings in document order
    pub headings: Vec<String>,
    /// Value of `<html lang>`
    pub language: Option<String>,

    /// Primary text, one paragraph per line
    pub text: String,
    pub word_count: usize,

    /// Outbound links, absolute and canonical
    pub links: Vec<String>,
    pub internal_link_count: usize,
    pub external_link_count: usize,

    pub strategy: FetchStrategy,
    pub fetched_at: DateTime<Utc>,

    /// Extracted-text length over raw body length, in [0, 1]
    pub confidence: f64,
}

/// A URL that did not produce a page record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUrl {
    pub url: String,
    pub reason: SkipReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

/// Result of one crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub seed: SeedRequest,

    /// Page records in discovery order
    pub pages: Vec<PageRecord>,

    /// Popped URLs in discovery order, then frontier rejections
    pub skipped: Vec<SkippedUrl>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// URLs for which a fetch was attempted
    pub pages_fetched: usize,

    pub stop_reason: StopReason,
}

impl CrawlReport {
    /// Wall-clock duration of the crawl
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Number of skips per reason, only reasons that occurred
    pub fn skip_counts(&self) -> BTreeMap<SkipReason, usize> {
        let mut counts = BTreeMap::new();
        for skipped in &self.skipped {
            *counts.entry(skipped.reason).or_insert(0) += 1;
        }
        counts
    }

    /// Number of page records per fetch strategy
    pub fn strategy_counts(&self) -> BTreeMap<FetchStrategy, usize> {
        let mut counts = BTreeMap::new();
        for page in &self.pages {
            *counts.entry(page.strategy).or_insert(0) += 1;
        }
        counts
    }

    /// Finds the page record for a canonical URL
    pub fn page(&self, url: &str) -> Option<&PageRecord> {
        self.pages.iter().find(|p| p.url == url)
    }

    /// Finds the skip entry for a canonical URL
    pub fn skip(&self, url: &str) -> Option<&SkippedUrl> {
        self.skipped.iter().find(|s| s.url == url)
    }

    /// True if no URL appears twice across pages and skips
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        self.pages
            .iter()
            .map(|p| p.url.as_str())
            .chain(self.skipped.iter().map(|s| s.url.as_str()))
            .all(|url| seen.insert(url))
    }

    /// Writes the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<(), CrawlError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a report written by [`CrawlReport::write_json`]
    pub fn read_json(path: &Path) -> Result<Self, CrawlError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
