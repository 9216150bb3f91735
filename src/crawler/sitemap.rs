//! Sitemap discovery used to seed the frontier
//!
//! Sitemap URLs come from robots.txt `Sitemap:` lines plus the default
//! `/sitemap.xml`. A `<sitemapindex>` is followed one level deep. Every
//! failure here is silent: sitemaps only add candidates.

use crate::crawler::fetcher::Fetcher;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Child sitemaps followed from one index
const MAX_CHILD_SITEMAPS: usize = 10;

/// A parsed sitemap document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sitemap {
    /// True for a `<sitemapindex>`, whose locations are further sitemaps
    pub is_index: bool,

    /// `<loc>` values in document order
    pub locations: Vec<String>,
}

/// Parses a sitemap or sitemap index
///
/// # Example
///
/// ```
/// use respectful_crawler::crawler::parse_sitemap;
///
/// let xml = r#"<urlset><url><loc>https://example.com/a</loc></url></urlset>"#;
/// let sitemap = parse_sitemap(xml);
/// assert!(!sitemap.is_index);
/// assert_eq!(sitemap.locations, vec!["https://example.com/a".to_string()]);
/// ```
pub fn parse_sitemap(xml: &str) -> Sitemap {
    let document = Html::parse_document(xml);

    let is_index = Selector::parse("sitemapindex")
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false);

    let locations = Selector::parse("loc")
        .map(|s| {
            document
                .select(&s)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|loc| !loc.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Sitemap {
        is_index,
        locations,
    }
}

/// Candidate sitemap URLs for a site, without duplicates
pub fn sitemap_candidates(seed: &Url, declared: &[String]) -> Vec<Url> {
    let mut seen = HashSet::new();
    declared
        .iter()
        .filter_map(|s| Url::parse(s).ok())
        .chain(seed.join("/sitemap.xml").ok())
        .filter(|u| seen.insert(u.as_str().to_string()))
        .collect()
}

/// Fetches the candidate sitemaps and returns the page URLs they list
///
/// # Arguments
///
/// * `fetcher` - Fetcher used for the requests (rate limited like any fetch)
/// * `candidates` - Sitemap URLs to try
/// * `crawl_delay` - The host's declared crawl delay
/// * `limit` - Stop once this many page URLs were collected
pub async fn collect_sitemap_urls(
    fetcher: &Fetcher,
    candidates: &[Url],
    crawl_delay: Option<Duration>,
    limit: usize,
) -> Vec<Url> {
    let mut pages = Vec::new();

    for candidate in candidates {
        if pages.len() >= limit {
            break;
        }
        let Some(body) = fetcher.fetch_document(candidate, crawl_delay).await else {
            tracing::debug!("No sitemap at {}", candidate);
            continue;
        };

        let sitemap = parse_sitemap(&body);
        if !sitemap.is_index {
            pages.extend(sitemap.locations.iter().filter_map(|l| Url::parse(l).ok()));
            continue;
        }

        tracing::debug!(
            "Sitemap index {} lists {} sitemaps",
            candidate,
            sitemap.locations.len()
        );
        for child in sitemap
            .locations
            .iter()
            .filter_map(|l| Url::parse(l).ok())
            .take(MAX_CHILD_SITEMAPS)
        {
            if pages.len() >= limit {
                break;
            }
            if let Some(body) = fetcher.fetch_document(&child, crawl_delay).await {
                let nested = parse_sitemap(&body);
                // Only one level of nesting is followed
                if !nested.is_index {
                    pages.extend(nested.locations.iter().filter_map(|l| Url::parse(l).ok()));
                }
            }
        }
    }

    pages.truncate(limit);
    tracing::info!("Collected {} URLs from sitemaps", pages.len());
    pages
}
