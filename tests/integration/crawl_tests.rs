//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use async_trait::async_trait;
use respectful_crawler::config::{Config, SeedRequest};
use respectful_crawler::crawler::{Coordinator, FetchError, FetchStrategy, PageRenderer, RenderedPage};
use respectful_crawler::output::{CrawlReport, SkipReason, StopReason};
use respectful_crawler::{ConfigError, CrawlError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a seed request with no delay floor
fn create_seed(base_url: &str, max_pages: usize, max_depth: u32) -> SeedRequest {
    SeedRequest {
        root_url: Url::parse(base_url).expect("Failed to parse base URL"),
        max_pages,
        max_depth,
        crawl_delay_ms: 0,
        respect_robots: true,
        locale: "en-GB".to_string(),
    }
}

/// Creates a test configuration with short timeouts
fn create_test_config(base_url: &str) -> Config {
    let mut config = Config::for_seed(base_url);
    config.crawler.max_concurrency = 4;
    config.crawler.use_sitemaps = false;
    config.fetch.min_text_length = 40;
    config.fetch.timeout_ms = 2000;
    config.fetch.robots_timeout_ms = 500;
    config.fetch.retry_backoff_ms = 10;
    config.user_agent.crawler_name = "TestBot".to_string();
    config
}

/// An HTML page with enough text to pass the low-content threshold
fn html_page(title: &str, links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="{}">{}</a>"#, l, l))
        .collect();
    format!(
        r#"<html><head><title>{0}</title></head><body>
        <main><h1>{0}</h1>
        <p>This is the {0} page. It has a paragraph of real content for the analyzer.</p>
        {1}
        </main></body></html>"#,
        title, anchors
    )
}

async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "text/html"),
        )
        .mount(server)
        .await;
}

async fn run(seed: SeedRequest, config: &Config) -> CrawlReport {
    Coordinator::with_seed(seed, config)
        .expect("Failed to create coordinator")
        .run()
        .await
        .expect("Crawl failed")
}

#[tokio::test]
async fn test_budget_limits_pages_and_homepage_first() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        html_page(
            "Home",
            &[
                format!("{}/a", base_url),
                format!("{}/b", base_url),
                format!("{}/c", base_url),
                "/d".to_string(),
            ],
        ),
    )
    .await;
    for p in ["/a", "/b", "/c", "/d"] {
        mount_page(&mock_server, p, html_page(p, &[])).await;
    }

    let report = run(create_seed(&base_url, 3, 1), &create_test_config(&base_url)).await;

    assert_eq!(report.pages.len(), 3);
    assert_eq!(report.pages[0].url, format!("{}/", base_url));
    assert_eq!(report.pages[0].depth, 0);
    assert_eq!(report.pages[1].url, format!("{}/a", base_url));
    assert_eq!(report.pages[2].url, format!("{}/b", base_url));
    assert_eq!(report.stop_reason, StopReason::BudgetReached);
    assert_eq!(report.pages_fetched, 3);

    for p in ["/c", "/d"] {
        let skip = report.skip(&format!("{}{}", base_url, p)).expect("missing skip");
        assert_eq!(skip.reason, SkipReason::BudgetExhausted);
    }
    assert!(report.is_consistent());
}

#[tokio::test]
async fn test_low_content_page_is_skipped() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", html_page("Home", &["/thin".to_string()])).await;
    mount_page(
        &mock_server,
        "/thin",
        "<html><body><p>Hello world!</p></body></html>".to_string(),
    )
    .await;

    let report = run(create_seed(&base_url, 10, 2), &create_test_config(&base_url)).await;

    assert_eq!(report.pages.len(), 1);
    let skip = report.skip(&format!("{}/thin", base_url)).expect("missing skip");
    assert_eq!(skip.reason, SkipReason::LowContent);
    assert_eq!(report.stop_reason, StopReason::FrontierExhausted);
}

#[tokio::test]
async fn test_robots_timeout_is_permissive() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/", html_page("Home", &["/about".to_string()])).await;
    mount_page(&mock_server, "/about", html_page("About", &[])).await;

    let mut config = create_test_config(&base_url);
    config.fetch.robots_timeout_ms = 200;
    let report = run(create_seed(&base_url, 10, 2), &config).await;

    assert_eq!(report.pages.len(), 2);
    assert!(report.skipped.iter().all(|s| s.reason != SkipReason::RobotsDisallowed));
}

#[tokio::test]
async fn test_robots_txt_respect() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "User-agent: *\nDisallow: /private\nAllow: /private/open\n\nUser-agent: OtherBot\nDisallow: /",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(
        &mock_server,
        "/",
        html_page(
            "Home",
            &[
                "/private/secret".to_string(),
                "/private/open/page".to_string(),
                "/public".to_string(),
            ],
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html_page("Secret", &[])))
        .expect(0)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/private/open/page", html_page("Open", &[])).await;
    mount_page(&mock_server, "/public", html_page("Public", &[])).await;

    let report = run(create_seed(&base_url, 10, 2), &create_test_config(&base_url)).await;

    assert_eq!(report.pages.len(), 3);
    assert!(report.page(&format!("{}/private/open/page", base_url)).is_some());
    let skip = report
        .skip(&format!("{}/private/secret", base_url))
        .expect("missing skip");
    assert_eq!(skip.reason, SkipReason::RobotsDisallowed);
    // A disallowed URL is never fetched
    assert_eq!(report.pages_fetched, 3);
}

#[tokio::test]
async fn test_ignore_robots() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
        .expect(0)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/", html_page("Home", &[])).await;

    let mut seed = create_seed(&base_url, 10, 2);
    seed.respect_robots = false;
    let report = run(seed, &create_test_config(&base_url)).await;

    assert_eq!(report.pages.len(), 1);
}

#[tokio::test]
async fn test_scope_and_depth_rejections_recorded() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        html_page(
            "Home",
            &[
                "https://elsewhere.example.org/page".to_string(),
                "/a".to_string(),
            ],
        ),
    )
    .await;
    mount_page(
        &mock_server,
        "/a",
        html_page(
            "A",
            &[
                "/a/deep".to_string(),
                "https://elsewhere.example.org/page".to_string(),
            ],
        ),
    )
    .await;

    let report = run(create_seed(&base_url, 10, 1), &create_test_config(&base_url)).await;

    assert_eq!(report.pages.len(), 2);
    for page in &report.pages {
        assert!(page.depth <= 1);
        assert!(page.url.starts_with(&base_url));
    }

    let out_of_scope = report
        .skip("https://elsewhere.example.org/page")
        .expect("missing out-of-scope skip");
    assert_eq!(out_of_scope.reason, SkipReason::OutOfScope);

    let deep = report
        .skip(&format!("{}/a/deep", base_url))
        .expect("missing depth skip");
    assert_eq!(deep.reason, SkipReason::DepthExceeded);

    // Recorded once even though it was linked twice
    assert_eq!(report.skip_counts().get(&SkipReason::OutOfScope), Some(&1));
    assert!(report.is_consistent());
}

#[tokio::test]
async fn test_fetch_errors_do_not_abort_crawl() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        html_page("Home", &["/missing".to_string(), "/broken".to_string()]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    let report = run(create_seed(&base_url, 10, 2), &create_test_config(&base_url)).await;

    assert_eq!(report.pages.len(), 1);
    for p in ["/missing", "/broken"] {
        let skip = report.skip(&format!("{}{}", base_url, p)).expect("missing skip");
        assert_eq!(skip.reason, SkipReason::FetchError);
    }
}

#[tokio::test]
async fn test_redirect_to_visited_page_is_duplicate() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        html_page("Home", &["/old".to_string(), "/new".to_string()]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/new", base_url).as_str()),
        )
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/new", html_page("New", &[])).await;

    let report = run(create_seed(&base_url, 10, 2), &create_test_config(&base_url)).await;

    assert_eq!(report.pages.len(), 2);
    assert!(report.page(&format!("{}/new", base_url)).is_some());
    let skip = report.skip(&format!("{}/old", base_url)).expect("missing skip");
    assert_eq!(skip.reason, SkipReason::Duplicate);
    assert!(report.is_consistent());
}

#[tokio::test]
async fn test_sitemap_urls_are_crawled() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("User-agent: *\nAllow: /\nSitemap: {}/map.xml", base_url)),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/map.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<urlset><url><loc>{}/hidden</loc></url></urlset>",
            base_url
        )))
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/", html_page("Home", &[])).await;
    mount_page(&mock_server, "/hidden", html_page("Hidden", &[])).await;

    let mut config = create_test_config(&base_url);
    config.crawler.use_sitemaps = true;
    let report = run(create_seed(&base_url, 10, 2), &config).await;

    assert_eq!(report.pages.len(), 2);
    assert_eq!(report.pages[0].url, format!("{}/", base_url));
    let hidden = report.page(&format!("{}/hidden", base_url)).expect("missing page");
    assert_eq!(hidden.depth, 1);
    assert_eq!(hidden.discovered_from, Some(format!("{}/", base_url)));
}

struct StaticRenderer;

#[async_trait]
impl PageRenderer for StaticRenderer {
    async fn render(&self, url: &Url, _timeout: Duration) -> Result<RenderedPage, FetchError> {
        Ok(RenderedPage {
            html: html_page("Rendered", &[]),
            final_url: Some(url.clone()),
        })
    }
}

#[tokio::test]
async fn test_thin_page_rendered_when_renderer_available() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        r#"<html><body><div id="app"></div><script src="/app.js"></script></body></html>"#.to_string(),
    )
    .await;

    let config = create_test_config(&base_url);
    let report = Coordinator::with_seed(create_seed(&base_url, 10, 1), &config)
        .unwrap()
        .with_renderer(Arc::new(StaticRenderer))
        .run()
        .await
        .unwrap();

    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.pages[0].strategy, FetchStrategy::Rendered);
    assert_eq!(report.pages[0].title.as_deref(), Some("Rendered"));
}

#[tokio::test]
async fn test_rendered_error_page_keeps_its_status() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", html_page("Home", &["/old".to_string()])).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_string("<html><body><div id=\"app\"></div></body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    let config = create_test_config(&base_url);
    let report = Coordinator::with_seed(create_seed(&base_url, 10, 1), &config)
        .unwrap()
        .with_renderer(Arc::new(StaticRenderer))
        .run()
        .await
        .unwrap();

    let home = report.page(&format!("{}/", base_url)).expect("missing home page");
    assert_eq!(home.status, 200);
    assert_eq!(home.strategy, FetchStrategy::Lightweight);

    let old = report.page(&format!("{}/old", base_url)).expect("missing rendered page");
    assert_eq!(old.strategy, FetchStrategy::Rendered);
    assert_eq!(old.status, 404);
}

/// Renderer whose task dies mid-fetch
struct CrashingRenderer;

#[async_trait]
impl PageRenderer for CrashingRenderer {
    async fn render(&self, url: &Url, _timeout: Duration) -> Result<RenderedPage, FetchError> {
        panic!("browser crashed on {}", url)
    }
}

#[tokio::test]
async fn test_crashed_fetch_task_is_reported() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", html_page("Home", &["/app".to_string()])).await;
    mount_page(
        &mock_server,
        "/app",
        r#"<html><body><div id="app"></div></body></html>"#.to_string(),
    )
    .await;

    let config = create_test_config(&base_url);
    let report = Coordinator::with_seed(create_seed(&base_url, 10, 1), &config)
        .unwrap()
        .with_renderer(Arc::new(CrashingRenderer))
        .run()
        .await
        .unwrap();

    assert_eq!(report.pages.len(), 1);
    let skip = report.skip(&format!("{}/app", base_url)).expect("missing skip");
    assert_eq!(skip.reason, SkipReason::FetchError);
    assert!(skip.detail.as_deref().unwrap_or_default().contains("browser crashed"));
    assert!(report.is_consistent());
}

#[tokio::test]
async fn test_crashed_seed_task_fails_crawl() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_page(
        &mock_server,
        "/",
        r#"<html><body><div id="app"></div></body></html>"#.to_string(),
    )
    .await;

    let config = create_test_config(&base_url);
    let result = Coordinator::with_seed(create_seed(&base_url, 10, 1), &config)
        .unwrap()
        .with_renderer(Arc::new(CrashingRenderer))
        .run()
        .await;

    assert!(matches!(result, Err(CrawlError::SeedUnreachable { .. })));
}

#[tokio::test]
async fn test_oversized_crawl_delay_does_not_abort_crawl() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nCrawl-delay: 1e30\nDisallow: /x"),
        )
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/", html_page("Home", &["/x".to_string()])).await;

    // One page: the capped delay is never waited on
    let report = run(create_seed(&base_url, 1, 1), &create_test_config(&base_url)).await;

    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.pages[0].url, format!("{}/", base_url));
    assert_eq!(report.stop_reason, StopReason::BudgetReached);
}

#[tokio::test]
async fn test_cancellation_stops_dispatch() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_page(&mock_server, "/", html_page("Home", &[])).await;

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let config = create_test_config(&base_url);
    let report = Coordinator::with_seed(create_seed(&base_url, 10, 1), &config)
        .unwrap()
        .with_shutdown(rx)
        .run()
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert!(report.pages.is_empty());
    assert_eq!(report.skipped[0].reason, SkipReason::BudgetExhausted);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let config = create_test_config("https://example.com/");

    let result = Coordinator::with_seed(create_seed("https://example.com/", 0, 1), &config);
    assert!(matches!(
        result,
        Err(CrawlError::Config(ConfigError::Validation(_)))
    ));

    let result = Coordinator::with_seed(create_seed("ftp://example.com/", 10, 1), &config);
    assert!(matches!(result, Err(CrawlError::Config(ConfigError::InvalidUrl(_)))));

    let mut config = create_test_config("https://example.com/");
    config.crawler.max_pages = 0;
    assert!(Coordinator::new(&config).is_err());
}

#[tokio::test]
async fn test_unreachable_seed_fails_crawl() {
    let base_url = "http://127.0.0.1:9";
    let result = Coordinator::with_seed(create_seed(base_url, 10, 1), &create_test_config(base_url))
        .unwrap()
        .run()
        .await;

    assert!(matches!(result, Err(CrawlError::SeedUnreachable { .. })));
}

#[tokio::test]
async fn test_seed_http_error_is_a_skip_not_a_failure() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    let report = run(create_seed(&base_url, 10, 1), &create_test_config(&base_url)).await;

    assert!(report.pages.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::FetchError);
}

#[tokio::test]
async fn test_report_json_round_trip() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", html_page("Home", &["/thin".to_string()])).await;
    mount_page(&mock_server, "/thin", "<html><body>tiny</body></html>".to_string()).await;

    let report = run(create_seed(&base_url, 10, 1), &create_test_config(&base_url)).await;

    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("crawl-report.json");
    report.write_json(&report_path).unwrap();

    let loaded = CrawlReport::read_json(&report_path).unwrap();
    assert_eq!(loaded, report);
    assert_eq!(loaded.seed.max_pages, 10);
    assert_eq!(loaded.skip_counts().get(&SkipReason::LowContent), Some(&1));
}
