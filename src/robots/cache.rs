//! Robots.txt policy caching
//!
//! A [`RobotsPolicy`] is the parsed rule set for one host together with when
//! it was fetched and how long it stays valid.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// Default lifetime of a cached policy
pub const DEFAULT_POLICY_TTL_HOURS: i64 = 24;

/// Cached robots.txt policy for a host
///
/// Immutable once stored; a stale policy is replaced, never mutated.
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    /// The parsed rules that apply to this crawler
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,

    /// How long the policy stays fresh
    pub ttl: Duration,

    /// False when this is the permissive fallback for a missing or failed robots.txt
    pub from_robots_file: bool,
}

impl RobotsPolicy {
    /// Creates a policy from parsed robots.txt content, stamped now
    pub fn new(content: ParsedRobots, ttl: Duration) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
            ttl,
            from_robots_file: true,
        }
    }

    /// Creates the permissive default: everything allowed, no declared delay
    pub fn permissive(ttl: Duration) -> Self {
        Self {
            content: ParsedRobots::allow_all(),
            fetched_at: Utc::now(),
            ttl,
            from_robots_file: false,
        }
    }

    /// Checks if the cached policy is older than its ttl
    pub fn is_stale(&self) -> bool {
        self.age() > self.ttl
    }

    /// Returns the age of the cached policy
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    /// Checks if a path is allowed according to the cached policy
    pub fn is_allowed(&self, path: &str) -> bool {
        self.content.is_allowed(path)
    }

    /// Gets the declared crawl delay
    pub fn crawl_delay(&self) -> Option<std::time::Duration> {
        self.content.crawl_delay
    }

    /// Sitemap URLs declared in the robots.txt
    pub fn sitemaps(&self) -> &[String] {
        &self.content.sitemaps
    }
}
