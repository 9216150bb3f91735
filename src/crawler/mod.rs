//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The frontier (queue plus visited-set) and its scope rules
//! - Per-host rate limiting
//! - HTTP fetching with retry and rendered escalation
//! - Content normalization and link extraction
//! - Sitemap seeding
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod normalizer;
mod rate_limiter;
mod render;
mod sitemap;

pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{
    build_http_client, classify_status, FetchError, FetchResult, FetchStrategy, Fetcher,
};
pub use frontier::{Frontier, FrontierEntry, OfferOutcome};
pub use normalizer::{extract_content, normalize, visible_text_length, ExtractedContent};
pub use rate_limiter::{HostState, RateLimiter};
pub use render::{PageRenderer, RenderedPage};
pub use sitemap::{collect_sitemap_urls, parse_sitemap, sitemap_candidates, Sitemap};

#[cfg(feature = "headless")]
pub use render::HeadlessRenderer;

use crate::config::Config;
use crate::output::CrawlReport;
use crate::CrawlError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Validate the configuration
/// 2. Build the HTTP client, robots resolver and rate limiter
/// 3. Seed the frontier (seed URL, then sitemaps)
/// 4. Fetch pages with bounded concurrency and follow same-site links
/// 5. Return the crawl report
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl completed
/// * `Err(CrawlError)` - Invalid configuration or unreachable seed
pub async fn crawl(config: Config) -> Result<CrawlReport, CrawlError> {
    run_crawl(&config, None).await
}
