//! Content normalizer
//!
//! Turns a fetched HTML body into an analysis-ready [`PageRecord`]:
//! - Title, meta description, headings and document language
//! - Primary text block with navigation, script and other boilerplate removed
//! - Outbound links resolved to absolute, canonical URLs
//! - A confidence score from the extracted-text to raw-body ratio
//!
//! Pages whose extracted text is shorter than the configured minimum are
//! returned as `low_content` skips.

use crate::config::FetchConfig;
use crate::crawler::fetcher::FetchResult;
use crate::crawler::frontier::FrontierEntry;
use crate::output::{PageRecord, SkipReason, SkippedUrl};
use crate::url::{normalize_parsed, same_site};
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Elements whose whole subtree is boilerplate
const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "form",
    "iframe", "svg", "canvas", "button", "select", "head",
];

/// class/id tokens that mark navigation and chrome
const BOILERPLATE_PATTERNS: &[&str] = &[
    "nav", "navbar", "menu", "sidebar", "footer", "header", "cookie", "breadcrumb", "banner",
    "advert", "ads", "share", "social", "popup", "modal", "skip-link",
];

/// Elements that break text into separate lines
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "ul", "ol", "dl", "dt", "dd", "table",
    "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "br", "blockquote", "pre",
    "figcaption", "address", "hr",
];

/// Everything extracted from one HTML document
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    /// h2 to h4 headings in document order
    pub headings: Vec<String>,
    /// Value of `<html lang>`
    pub language: Option<String>,
    /// Primary text, one paragraph per line
    pub text: String,
    /// Absolute http(s) links, canonicalized and de-duplicated
    pub links: Vec<Url>,
}

/// Parses HTML and extracts text, metadata, and links
///
/// # Link Extraction Rules
///
/// **Include:** `<a href>` anywhere in the document (navigation included) and
/// `<link rel="canonical">`.
///
/// **Exclude:** `<a download>`, `javascript:`, `mailto:`, `tel:` and `data:`
/// links, fragment-only links, and anything not http(s) after resolution.
///
/// # Example
///
/// ```
/// use respectful_crawler::crawler::extract_content;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><main><p>Hello</p><a href="/page">Link</a></main></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let content = extract_content(html, &base_url, 100);
/// assert_eq!(content.title, Some("Test".to_string()));
/// assert_eq!(content.links[0].as_str(), "https://example.com/page");
/// ```
pub fn extract_content(html: &str, base_url: &Url, max_links: usize) -> ExtractedContent {
    let document = Html::parse_document(html);

    let h1 = first_text(&document, "h1");
    let title = first_text(&document, "title")
        .or_else(|| meta_content(&document, "property", "og:title"))
        .or_else(|| h1.clone());

    ExtractedContent {
        title,
        meta_description: meta_content(&document, "name", "description"),
        h1,
        headings: all_text(&document, "h2, h3, h4"),
        language: select_attr(&document, "html[lang]", "lang"),
        text: primary_text(&document),
        links: extract_links(&document, base_url, max_links),
    }
}

/// Number of visible characters in the primary text of an HTML document
///
/// This is the same measure the low-content rule uses.
pub fn visible_text_length(html: &str) -> usize {
    let document = Html::parse_document(html);
    primary_text(&document).chars().count()
}

/// Converts a fetch result into a page record, or a skip with its reason
///
/// # Arguments
///
/// * `fetch` - The fetch result (consumed)
/// * `entry` - The frontier entry the fetch was made for
/// * `config` - Thresholds: minimum text length and links kept per page
pub fn normalize(
    fetch: FetchResult,
    entry: &FrontierEntry,
    config: &FetchConfig,
) -> Result<PageRecord, SkippedUrl> {
    let skip = |reason: SkipReason, detail: String| SkippedUrl {
        url: entry.url.to_string(),
        reason,
        detail: Some(detail),
        depth: Some(entry.depth),
    };

    if let Some(error) = &fetch.error {
        return Err(skip(SkipReason::FetchError, error.to_string()));
    }
    let (Some(body), Some(status)) = (fetch.body.as_deref(), fetch.status) else {
        return Err(skip(SkipReason::FetchError, "empty response".to_string()));
    };

    let content = extract_content(body, &fetch.final_url, config.max_links_per_page);
    let text_length = content.text.chars().count();

    if text_length < config.min_text_length {
        return Err(skip(
            SkipReason::LowContent,
            format!(
                "{} visible characters, minimum is {}",
                text_length, config.min_text_length
            ),
        ));
    }

    let confidence = if body.is_empty() {
        0.0
    } else {
        let ratio = (content.text.len() as f64 / body.len() as f64).clamp(0.0, 1.0);
        (ratio * 10_000.0).round() / 10_000.0
    };

    let internal_link_count = content
        .links
        .iter()
        .filter(|link| same_site(link, &fetch.final_url))
        .count();
    let external_link_count = content.links.len() - internal_link_count;

    Ok(PageRecord {
        url: entry.url.to_string(),
        final_url: fetch.final_url.to_string(),
        depth: entry.depth,
        discovered_from: entry.discovered_from.as_ref().map(|u| u.to_string()),
        status,
        title: content.title,
        meta_description: content.meta_description,
        h1: content.h1,
        headings: content.headings,
        language: content.language,
        word_count: content.text.split_whitespace().count(),
        text: content.text,
        links: content.links.iter().map(|u| u.to_string()).collect(),
        internal_link_count,
        external_link_count,
        strategy: fetch.strategy,
        fetched_at: Utc::now(),
        confidence,
    })
}

/// Chooses the primary content block and returns its cleaned text
///
/// `<main>` or `[role=main]` wins, then a lone `<article>`, then `<body>`.
/// A candidate holding less than a quarter of the body text is ignored.
fn primary_text(document: &Html) -> String {
    let body_text = selector("body")
        .and_then(|s| document.select(&s).next())
        .map(block_text)
        .unwrap_or_default();

    let candidate = selector("main, [role=main]")
        .and_then(|s| document.select(&s).next())
        .or_else(|| {
            let s = selector("article")?;
            let articles: Vec<ElementRef<'_>> = document.select(&s).take(2).collect();
            match articles.as_slice() {
                [only] => Some(*only),
                _ => None,
            }
        });

    match candidate.map(block_text) {
        Some(text) if text.len() * 4 >= body_text.len() => text,
        _ => body_text,
    }
}

/// Collects the cleaned text of one element
fn block_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);
    clean_text(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if is_boilerplate(child_element) {
                continue;
            }
            let is_block = BLOCK_TAGS.contains(&child_element.value().name());
            if is_block {
                out.push('\n');
            }
            collect_text(child_element, out);
            if is_block {
                out.push('\n');
            }
        }
    }
}

fn is_boilerplate(element: ElementRef<'_>) -> bool {
    let value = element.value();
    if BOILERPLATE_TAGS.contains(&value.name()) {
        return true;
    }
    if value.attr("hidden").is_some() || value.attr("aria-hidden") == Some("true") {
        return true;
    }
    if matches!(value.attr("role"), Some("navigation" | "banner" | "contentinfo")) {
        return true;
    }

    value
        .classes()
        .chain(value.id())
        .any(|token| is_boilerplate_token(&token.to_ascii_lowercase()))
}

fn is_boilerplate_token(token: &str) -> bool {
    BOILERPLATE_PATTERNS.iter().any(|p| {
        token == *p
            || token.starts_with(&format!("{}-", p))
            || token.starts_with(&format!("{}_", p))
            || token.ends_with(&format!("-{}", p))
            || token.ends_with(&format!("_{}", p))
    })
}

/// Collapses whitespace within lines, drops empty and repeated lines
fn clean_text(raw: &str) -> String {
    let mut seen = HashSet::new();
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.clone()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extracts all valid links, in document order, without duplicates
fn extract_links(document: &Html, base_url: &Url, max_links: usize) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let anchors = selector("a[href]")
        .map(|s| {
            document
                .select(&s)
                .filter(|el| el.value().attr("download").is_none())
                .filter_map(|el| el.value().attr("href"))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let canonical = selector("link[rel='canonical'][href]")
        .map(|s| {
            document
                .select(&s)
                .filter_map(|el| el.value().attr("href"))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    for href in anchors.into_iter().chain(canonical) {
        if links.len() >= max_links {
            break;
        }
        if let Some(url) = resolve_link(href, base_url) {
            if seen.insert(url.as_str().to_string()) {
                links.push(url);
            }
        }
    }

    links
}

/// Resolves a link href to a canonical absolute URL
///
/// Returns None for special schemes, fragment-only links, invalid URLs and
/// anything that is not http(s) after resolution.
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    normalize_parsed(absolute).ok()
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let s = selector(css)?;
    document
        .select(&s)
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn all_text(document: &Html, css: &str) -> Vec<String> {
    selector(css)
        .map(|s| {
            document
                .select(&s)
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn meta_content(document: &Html, attr: &str, name: &str) -> Option<String> {
    let s = selector(&format!("meta[{}][content]", attr))?;
    document
        .select(&s)
        .find(|el| {
            el.value()
                .attr(attr)
                .is_some_and(|v| v.eq_ignore_ascii_case(name))
        })
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn select_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let s = selector(css)?;
    document
        .select(&s)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
