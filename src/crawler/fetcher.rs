//! HTTP fetcher implementation
//!
//! This module handles all page requests for the crawler:
//! - Building the HTTP client with the crawl-identifying user agent
//! - The lightweight strategy (a direct GET)
//! - Escalation to the rendered strategy for thin or failed pages
//! - A single retry for transient failures
//! - Error classification

use crate::config::{FetchConfig, UserAgentConfig};
use crate::crawler::normalizer::visible_text_length;
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::render::PageRenderer;
use crate::url::host_key;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Which strategy produced a fetch result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Plain HTTP GET
    Lightweight,
    /// Headless browser render
    Rendered,
}

impl FetchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lightweight => "lightweight",
            Self::Rendered => "rendered",
        }
    }
}

/// Why a fetch produced no usable body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeouts, resets, 5xx and 429: retried once
    #[error("transient: {0}")]
    Transient(String),

    /// 4xx, DNS failure, unsupported content: never retried
    #[error("permanent: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Result of fetching one URL
///
/// Transient: consumed by the normalizer right away.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The URL that was requested
    pub url: Url,
    /// URL after redirects
    pub final_url: Url,
    /// HTTP status, None when no response was received
    pub status: Option<u16>,
    /// Page body, present only on success
    pub body: Option<String>,
    /// Content-Type header value
    pub content_type: Option<String>,
    pub strategy: FetchStrategy,
    pub elapsed: Duration,
    pub error: Option<FetchError>,
    /// Number of requests made for this strategy (1, or 2 after a retry)
    pub attempts: u32,
}

impl FetchResult {
    fn failed(url: &Url, strategy: FetchStrategy, started: Instant, error: FetchError) -> Self {
        Self {
            url: url.clone(),
            final_url: url.clone(),
            status: None,
            body: None,
            content_type: None,
            strategy,
            elapsed: started.elapsed(),
            error: Some(error),
            attempts: 1,
        }
    }

    /// True when a body was received with a 2xx status
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.body.is_some()
    }

    /// True when the server never answered (network or DNS failure)
    pub fn is_unreachable(&self) -> bool {
        self.status.is_none() && self.error.is_some()
    }

    pub fn is_html(&self) -> bool {
        is_html_content_type(self.content_type.as_deref())
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use respectful_crawler::config::UserAgentConfig;
/// use respectful_crawler::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default(), "en-GB").unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig, locale: &str) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.5"),
    );
    if let Ok(value) = HeaderValue::from_str(&accept_language(locale)) {
        headers.insert(ACCEPT_LANGUAGE, value);
    }

    Client::builder()
        .user_agent(config.header_value())
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `en-GB` becomes `en-GB,en;q=0.9,*;q=0.5`
fn accept_language(locale: &str) -> String {
    match locale.split(['-', '_']).next() {
        Some(lang) if lang != locale => format!("{},{};q=0.9,*;q=0.5", locale, lang),
        _ => format!("{},*;q=0.5", locale),
    }
}

/// Fetches pages with the lightweight strategy and an optional rendered fallback
///
/// Every request start (first attempt, retry, or escalation) takes a slot
/// from the rate limiter for the URL's host.
pub struct Fetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    renderer: Option<Arc<dyn PageRenderer>>,
    timeout: Duration,
    retry_backoff: Duration,
    min_text_length: usize,
}

impl Fetcher {
    pub fn new(client: Client, limiter: Arc<RateLimiter>, config: &FetchConfig) -> Self {
        Self {
            client,
            limiter,
            renderer: None,
            timeout: config.timeout(),
            retry_backoff: config.retry_backoff(),
            min_text_length: config.min_text_length,
        }
    }

    /// Enables escalation to the rendered strategy
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// Fetches a URL, escalating to the renderer at most once
    ///
    /// # Request Flow
    ///
    /// 1. Lightweight GET (retried once on a transient failure)
    /// 2. If a response came back but is non-2xx, non-HTML, or has less
    ///    visible text than the threshold, render the page (same retry rule)
    /// 3. Use the rendered result if it succeeded, otherwise the first one.
    ///    A rendered result reports the lightweight response's HTTP status.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    /// * `crawl_delay` - The host's declared crawl delay, if any
    pub async fn fetch(&self, url: &Url, crawl_delay: Option<Duration>) -> FetchResult {
        let host = host_key(url).unwrap_or_default();

        let primary = self
            .with_retry(&host, crawl_delay, || self.fetch_lightweight(url))
            .await;

        let Some(renderer) = &self.renderer else {
            return primary;
        };
        if !self.needs_render(&primary) {
            return primary;
        }

        tracing::debug!(
            "Escalating {} to rendered fetch (status {:?}, error {:?})",
            url,
            primary.status,
            primary.error
        );
        let mut rendered = self
            .with_retry(&host, crawl_delay, || {
                self.fetch_rendered(renderer.as_ref(), url)
            })
            .await;

        if rendered.is_success() {
            // The browser does not expose the document status; keep the server's
            rendered.status = primary.status;
            rendered
        } else {
            tracing::debug!("Rendered fetch of {} failed, keeping lightweight result", url);
            primary
        }
    }

    /// Fetches a non-page document (sitemaps) with the lightweight strategy
    ///
    /// Any content type is accepted. Returns None on any failure.
    pub async fn fetch_document(&self, url: &Url, crawl_delay: Option<Duration>) -> Option<String> {
        let host = host_key(url)?;
        self.limiter.acquire(&host, crawl_delay).await;

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            tracing::debug!("{} returned HTTP {}", url, response.status());
            return None;
        }
        response.text().await.ok()
    }

    /// Escalation rule for a lightweight result
    fn needs_render(&self, result: &FetchResult) -> bool {
        if result.status.is_none() {
            return false;
        }
        if result.status.is_some_and(|s| !(200..300).contains(&s)) || !result.is_html() {
            return true;
        }
        match &result.body {
            Some(body) => visible_text_length(body) < self.min_text_length,
            None => true,
        }
    }

    /// Runs one strategy with the shared retry policy
    async fn with_retry<F, Fut>(
        &self,
        host: &str,
        crawl_delay: Option<Duration>,
        mut attempt: F,
    ) -> FetchResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchResult>,
    {
        self.limiter.acquire(host, crawl_delay).await;
        let first = attempt().await;

        match &first.error {
            Some(FetchError::Transient(reason)) => {
                tracing::debug!(
                    "Transient failure for {} ({}), retrying once after {:?}",
                    first.url,
                    reason,
                    self.retry_backoff
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.limiter.acquire(host, crawl_delay).await;

                let mut second = attempt().await;
                second.attempts = 2;
                second
            }
            _ => first,
        }
    }

    async fn fetch_lightweight(&self, url: &Url) -> FetchResult {
        let started = Instant::now();

        let response = match self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return FetchResult::failed(
                    url,
                    FetchStrategy::Lightweight,
                    started,
                    classify_request_error(&e),
                )
            }
        };

        let status = response.status();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut result = FetchResult {
            url: url.clone(),
            final_url,
            status: Some(status.as_u16()),
            body: None,
            content_type,
            strategy: FetchStrategy::Lightweight,
            elapsed: Duration::ZERO,
            error: None,
            attempts: 1,
        };

        if !status.is_success() {
            result.error = Some(classify_status(status));
        } else if !result.is_html() {
            result.error = Some(FetchError::Permanent(format!(
                "unsupported content type {}",
                result.content_type.as_deref().unwrap_or("")
            )));
        } else {
            match response.text().await {
                Ok(body) => result.body = Some(body),
                Err(e) => result.error = Some(classify_request_error(&e)),
            }
        }

        result.elapsed = started.elapsed();
        result
    }

    async fn fetch_rendered(&self, renderer: &dyn PageRenderer, url: &Url) -> FetchResult {
        let started = Instant::now();

        match renderer.render(url, self.timeout).await {
            Ok(page) => FetchResult {
                url: url.clone(),
                final_url: page.final_url.unwrap_or_else(|| url.clone()),
                status: Some(StatusCode::OK.as_u16()),
                body: Some(page.html),
                content_type: Some("text/html".to_string()),
                strategy: FetchStrategy::Rendered,
                elapsed: started.elapsed(),
                error: None,
                attempts: 1,
            },
            Err(e) => FetchResult::failed(url, FetchStrategy::Rendered, started, e),
        }
    }
}

/// A missing Content-Type is given the benefit of the doubt
fn is_html_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml+xml")
        }
    }
}

/// Maps an HTTP status to a fetch error
///
/// | Status | Class |
/// |--------|-------|
/// | 408, 429, 5xx | Transient |
/// | other 4xx, anything else | Permanent |
pub fn classify_status(status: StatusCode) -> FetchError {
    let message = format!("HTTP {}", status.as_u16());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        FetchError::Transient(message)
    } else {
        FetchError::Permanent(message)
    }
}

/// Maps a client error to a fetch error
///
/// DNS failures, redirect loops, and undecodable bodies are permanent;
/// timeouts, resets, and refused connections are transient.
fn classify_request_error(error: &reqwest::Error) -> FetchError {
    if is_dns_failure(error) {
        return FetchError::Permanent(format!("DNS resolution failed: {}", error));
    }
    if error.is_redirect() || error.is_decode() || error.is_builder() {
        return FetchError::Permanent(error.to_string());
    }
    if error.is_timeout() {
        return FetchError::Transient("request timeout".to_string());
    }
    FetchError::Transient(error.to_string())
}

fn is_dns_failure(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(error);
    while let Some(err) = source {
        let message = err.to_string().to_lowercase();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return true;
        }
        source = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&UserAgentConfig::default(), "en-GB").is_ok());
    }

    #[test]
    fn test_user_agent_format() {
        let config = UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        };
        assert_eq!(
            config.header_value(),
            "TestCrawler/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[test]
    fn test_accept_language() {
        assert_eq!(accept_language("en-GB"), "en-GB,en;q=0.9,*;q=0.5");
        assert_eq!(accept_language("de"), "de,*;q=0.5");
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR).is_transient());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!classify_status(StatusCode::NOT_FOUND).is_transient());
        assert!(!classify_status(StatusCode::FORBIDDEN).is_transient());
    }

    #[test]
    fn test_is_html_content_type() {
        assert!(is_html_content_type(Some("text/html; charset=utf-8")));
        assert!(is_html_content_type(Some("application/xhtml+xml")));
        assert!(is_html_content_type(None));
        assert!(!is_html_content_type(Some("application/pdf")));
        assert!(!is_html_content_type(Some("application/json")));
    }

    mod network {
        use super::*;
        use crate::crawler::render::RenderedPage;
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const RICH_PAGE: &str = "<html><head><title>Rich</title></head><body><main><p>This page has plenty of visible text so that the normalizer will consider it a real document worth keeping.</p></main></body></html>";

        struct StubRenderer {
            html: String,
            calls: AtomicUsize,
        }

        #[async_trait]
        impl PageRenderer for StubRenderer {
            async fn render(&self, _url: &Url, _timeout: Duration) -> Result<RenderedPage, FetchError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(RenderedPage {
                    html: self.html.clone(),
                    final_url: None,
                })
            }
        }

        fn fetcher() -> Fetcher {
            let config = FetchConfig {
                timeout_ms: 2000,
                retry_backoff_ms: 10,
                min_text_length: 50,
                ..FetchConfig::default()
            };
            Fetcher::new(
                build_http_client(&UserAgentConfig::default(), "en-GB").unwrap(),
                Arc::new(RateLimiter::new(Duration::ZERO)),
                &config,
            )
        }

        fn html(body: &str) -> ResponseTemplate {
            ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
        }

        #[tokio::test]
        async fn test_success_single_attempt() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/page"))
                .respond_with(html(RICH_PAGE))
                .expect(1)
                .mount(&server)
                .await;

            let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
            let result = fetcher().fetch(&url, None).await;

            assert!(result.is_success());
            assert_eq!(result.status, Some(200));
            assert_eq!(result.strategy, FetchStrategy::Lightweight);
            assert_eq!(result.attempts, 1);
        }

        #[tokio::test]
        async fn test_transient_failure_retried_once() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/flaky"))
                .respond_with(ResponseTemplate::new(503))
                .up_to_n_times(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/flaky"))
                .respond_with(html(RICH_PAGE))
                .mount(&server)
                .await;

            let url = Url::parse(&format!("{}/flaky", server.uri())).unwrap();
            let result = fetcher().fetch(&url, None).await;

            assert!(result.is_success());
            assert_eq!(result.attempts, 2);
        }

        #[tokio::test]
        async fn test_transient_failure_gives_up_after_retry() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/down"))
                .respond_with(ResponseTemplate::new(500))
                .expect(2)
                .mount(&server)
                .await;

            let url = Url::parse(&format!("{}/down", server.uri())).unwrap();
            let result = fetcher().fetch(&url, None).await;

            assert!(!result.is_success());
            assert!(result.body.is_none());
            assert!(matches!(result.error, Some(FetchError::Transient(_))));
        }

        #[tokio::test]
        async fn test_permanent_failure_not_retried() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/missing"))
                .respond_with(ResponseTemplate::new(404))
                .expect(1)
                .mount(&server)
                .await;

            let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
            let result = fetcher().fetch(&url, None).await;

            assert_eq!(result.status, Some(404));
            assert_eq!(result.attempts, 1);
            assert!(matches!(result.error, Some(FetchError::Permanent(_))));
        }

        #[tokio::test]
        async fn test_non_html_is_permanent_failure() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/file.pdf"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string("%PDF-1.4")
                        .insert_header("content-type", "application/pdf"),
                )
                .mount(&server)
                .await;

            let url = Url::parse(&format!("{}/file.pdf", server.uri())).unwrap();
            let result = fetcher().fetch(&url, None).await;

            assert!(!result.is_html());
            assert!(matches!(result.error, Some(FetchError::Permanent(_))));
        }

        #[tokio::test]
        async fn test_thin_page_escalates_to_renderer_once() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/app"))
                .respond_with(html("<html><body><div id=\"root\"></div></body></html>"))
                .mount(&server)
                .await;

            let renderer = Arc::new(StubRenderer {
                html: RICH_PAGE.to_string(),
                calls: AtomicUsize::new(0),
            });
            let fetcher = fetcher().with_renderer(renderer.clone());

            let url = Url::parse(&format!("{}/app", server.uri())).unwrap();
            let result = fetcher.fetch(&url, None).await;

            assert_eq!(result.strategy, FetchStrategy::Rendered);
            assert!(result.is_success());
            assert_eq!(result.status, Some(200));
            assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_rendered_error_page_keeps_server_status() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/gone"))
                .respond_with(
                    ResponseTemplate::new(404)
                        .set_body_string("<html><body>Not found</body></html>")
                        .insert_header("content-type", "text/html"),
                )
                .mount(&server)
                .await;

            let renderer = Arc::new(StubRenderer {
                html: RICH_PAGE.to_string(),
                calls: AtomicUsize::new(0),
            });
            let fetcher = fetcher().with_renderer(renderer.clone());

            let url = Url::parse(&format!("{}/gone", server.uri())).unwrap();
            let result = fetcher.fetch(&url, None).await;

            assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
            assert_eq!(result.strategy, FetchStrategy::Rendered);
            assert_eq!(result.status, Some(404));
        }

        #[tokio::test]
        async fn test_rich_page_does_not_escalate() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rich"))
                .respond_with(html(RICH_PAGE))
                .mount(&server)
                .await;

            let renderer = Arc::new(StubRenderer {
                html: RICH_PAGE.to_string(),
                calls: AtomicUsize::new(0),
            });
            let fetcher = fetcher().with_renderer(renderer.clone());

            let url = Url::parse(&format!("{}/rich", server.uri())).unwrap();
            let result = fetcher.fetch(&url, None).await;

            assert_eq!(result.strategy, FetchStrategy::Lightweight);
            assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn test_unreachable_host_does_not_escalate() {
            let renderer = Arc::new(StubRenderer {
                html: RICH_PAGE.to_string(),
                calls: AtomicUsize::new(0),
            });
            let fetcher = fetcher().with_renderer(renderer.clone());

            // Port 9 (discard) on localhost is expected to refuse connections
            let url = Url::parse("http://127.0.0.1:9/").unwrap();
            let result = fetcher.fetch(&url, None).await;

            assert!(result.is_unreachable());
            assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
        }
    }
}
