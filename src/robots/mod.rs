//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files. A missing or unreachable robots.txt never blocks a crawl:
//! it resolves to a permissive policy.

mod cache;
mod parser;

pub use cache::{RobotsPolicy, DEFAULT_POLICY_TTL_HOURS};
pub use parser::{ParsedRobots, Rule, RuleKind, MAX_CRAWL_DELAY};

use crate::url::{origin_of, path_and_query};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

type PolicySlot = Arc<OnceCell<Arc<RobotsPolicy>>>;

/// Resolves and caches one robots.txt policy per origin
///
/// Concurrent resolutions for the same origin share a single fetch. The map
/// lock is only held to look up or replace a slot, never across the network
/// request.
pub struct RobotsResolver {
    client: Client,
    product_token: String,
    timeout: Duration,
    ttl: chrono::Duration,
    cache: Mutex<HashMap<String, PolicySlot>>,
}

impl RobotsResolver {
    /// Creates a resolver
    ///
    /// # Arguments
    ///
    /// * `client` - The HTTP client (carries the crawler's user agent)
    /// * `product_token` - Token matched against `User-agent` groups
    /// * `timeout` - Timeout for each robots.txt request
    pub fn new(client: Client, product_token: &str, timeout: Duration) -> Self {
        Self {
            client,
            product_token: product_token.to_string(),
            timeout,
            ttl: chrono::Duration::hours(DEFAULT_POLICY_TTL_HOURS),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the policy ttl
    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the policy for the URL's origin, fetching it on first use
    ///
    /// A stale policy is dropped and fetched again on the next call.
    pub async fn resolve(&self, url: &Url) -> Arc<RobotsPolicy> {
        let Some(origin) = origin_of(url) else {
            return Arc::new(RobotsPolicy::permissive(self.ttl));
        };

        let slot = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            let slot = cache
                .entry(origin.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()));
            if slot.get().is_some_and(|policy| policy.is_stale()) {
                tracing::debug!("robots.txt policy for {} is stale, refreshing", origin);
                *slot = Arc::new(OnceCell::new());
            }
            Arc::clone(slot)
        };

        slot.get_or_init(|| async { Arc::new(self.fetch_policy(&origin).await) })
            .await
            .clone()
    }

    /// Number of origins with a cached or in-flight policy
    pub fn cached_hosts(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn fetch_policy(&self, origin: &str) -> RobotsPolicy {
        let robots_url = format!("{}/robots.txt", origin);
        tracing::debug!("Fetching robots.txt from {}", robots_url);

        let response = match self
            .client
            .get(&robots_url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch robots.txt for {}: {}; treating as allow-all",
                    origin,
                    e
                );
                return RobotsPolicy::permissive(self.ttl);
            }
        };

        if !response.status().is_success() {
            tracing::debug!(
                "robots.txt for {} returned HTTP {}; treating as allow-all",
                origin,
                response.status()
            );
            return RobotsPolicy::permissive(self.ttl);
        }

        match response.text().await {
            Ok(body) => {
                let parsed = ParsedRobots::parse(&body, &self.product_token);
                tracing::info!(
                    "Loaded robots.txt for {} ({} rules, crawl-delay {:?})",
                    origin,
                    parsed.rules.len(),
                    parsed.crawl_delay
                );
                RobotsPolicy::new(parsed, self.ttl)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read robots.txt body for {}: {}; treating as allow-all",
                    origin,
                    e
                );
                RobotsPolicy::permissive(self.ttl)
            }
        }
    }
}

/// Checks if a URL is allowed by a policy
pub fn is_allowed(policy: &RobotsPolicy, url: &Url) -> bool {
    policy.is_allowed(&path_and_query(url))
}
