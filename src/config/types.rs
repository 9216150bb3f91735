use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawl scope and politeness configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Root URL the crawl starts from
    pub seed_url: String,

    /// Maximum number of page records in the report
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Maximum link depth from the seed (the seed is depth 0)
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Minimum time between fetch starts on the same host (milliseconds)
    #[serde(default = "default_crawl_delay_ms")]
    pub crawl_delay_ms: u64,

    /// Number of fetches allowed in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_true")]
    pub respect_robots: bool,

    /// Locale sent as Accept-Language
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Offer sitemap entries to the frontier before crawling
    #[serde(default = "default_true")]
    pub use_sitemaps: bool,
}

/// Fetcher and content thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Per-request timeout for both fetch strategies (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Timeout for robots.txt requests (milliseconds)
    #[serde(default = "default_robots_timeout_ms")]
    pub robots_timeout_ms: u64,

    /// Fixed backoff before the single retry of a transient failure (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Pages with fewer visible characters than this are skipped as low content
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,

    /// Escalate thin or failed pages to the headless renderer
    #[serde(default)]
    pub render_fallback: bool,

    /// Outbound links kept per page
    #[serde(default = "default_max_links_per_page")]
    pub max_links_per_page: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            robots_timeout_ms: default_robots_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            min_text_length: default_min_text_length(),
            render_fallback: false,
            max_links_per_page: default_max_links_per_page(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn robots_timeout(&self) -> Duration {
        Duration::from_millis(self.robots_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also the product token matched against robots.txt groups
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the full user agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "RespectfulCrawler".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/crawler".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path of the JSON crawl report
    #[serde(default = "default_report_path")]
    pub report_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: default_report_path(),
        }
    }
}

/// The immutable input of a single crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedRequest {
    pub root_url: Url,
    pub max_pages: usize,
    pub max_depth: u32,
    /// Configured floor for the per-host delay (milliseconds)
    pub crawl_delay_ms: u64,
    pub respect_robots: bool,
    pub locale: String,
}

impl SeedRequest {
    /// Creates a seed request with default limits for the given root URL
    pub fn new(root_url: Url) -> Self {
        Self {
            root_url,
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            crawl_delay_ms: default_crawl_delay_ms(),
            respect_robots: true,
            locale: default_locale(),
        }
    }

    pub fn crawl_delay(&self) -> Duration {
        Duration::from_millis(self.crawl_delay_ms)
    }
}

impl Config {
    /// Builds a config around a seed URL with every other value defaulted
    pub fn for_seed(seed_url: &str) -> Self {
        Self {
            crawler: CrawlerConfig {
                seed_url: seed_url.to_string(),
                max_pages: default_max_pages(),
                max_depth: default_max_depth(),
                crawl_delay_ms: default_crawl_delay_ms(),
                max_concurrency: default_max_concurrency(),
                respect_robots: true,
                locale: default_locale(),
                use_sitemaps: true,
            },
            fetch: FetchConfig::default(),
            user_agent: UserAgentConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

fn default_max_pages() -> usize {
    100
}

fn default_max_depth() -> u32 {
    3
}

fn default_crawl_delay_ms() -> u64 {
    1000
}

fn default_max_concurrency() -> usize {
    5
}

fn default_locale() -> String {
    "en-GB".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_robots_timeout_ms() -> u64 {
    5_000
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_min_text_length() -> usize {
    100
}

fn default_max_links_per_page() -> usize {
    500
}

fn default_report_path() -> String {
    "./crawl-report.json".to_string()
}
