//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that:
//! - Seeds the frontier from the seed URL and, optionally, its sitemaps
//! - Dispatches frontier entries to a bounded pool of fetch tasks
//! - Runs each entry through robots check, fetch and normalization
//! - Feeds discovered links back into the frontier
//! - Stops on an empty frontier, an exhausted page budget or cancellation,
//!   letting in-flight fetches finish
//! - Assembles the final crawl report

use crate::config::{validate, validate_seed, Config, FetchConfig, SeedRequest};
use crate::crawler::fetcher::{build_http_client, Fetcher};
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::crawler::normalizer::normalize;
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::render::PageRenderer;
use crate::crawler::sitemap::{collect_sitemap_urls, sitemap_candidates};
use crate::output::{CrawlReport, PageRecord, SkipReason, SkippedUrl, StopReason};
use crate::robots::{is_allowed, RobotsResolver};
use crate::url::normalize_parsed;
use crate::CrawlError;
use chrono::Utc;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use url::Url;

/// How one popped entry ended
#[derive(Debug)]
enum Outcome {
    Page(PageRecord),
    Skipped(SkippedUrl),
}

/// Result of one fetch task
#[derive(Debug)]
struct Completed {
    entry: FrontierEntry,
    outcome: Outcome,
    /// A fetch was attempted (not stopped by robots.txt)
    fetched: bool,
    /// No response was received at all (or the task died); the reason, if so
    unreachable: Option<String>,
}

/// State shared by every fetch task
struct WorkerContext {
    frontier: Arc<Frontier>,
    robots: RobotsResolver,
    fetcher: Fetcher,
    fetch_config: FetchConfig,
    respect_robots: bool,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    seed: SeedRequest,
    fetch_config: FetchConfig,
    max_concurrency: usize,
    use_sitemaps: bool,
    robots: RobotsResolver,
    fetcher: Fetcher,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Coordinator {
    /// Creates a coordinator from a validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(CrawlError)` - Invalid configuration, or the HTTP client or
    ///   renderer could not be built
    pub fn new(config: &Config) -> Result<Self, CrawlError> {
        validate(config)?;
        let seed = config.seed_request()?;
        Self::with_seed(seed, config)
    }

    /// Creates a coordinator for an explicit seed request
    ///
    /// `config` supplies everything that is not part of the seed request
    /// (fetch settings, user agent, concurrency).
    pub fn with_seed(seed: SeedRequest, config: &Config) -> Result<Self, CrawlError> {
        validate_seed(&seed)?;

        let client = build_http_client(&config.user_agent, &seed.locale)?;
        let robots = RobotsResolver::new(
            client.clone(),
            &config.user_agent.crawler_name,
            config.fetch.robots_timeout(),
        );
        let limiter = Arc::new(RateLimiter::new(seed.crawl_delay()));
        let fetcher = Fetcher::new(client, limiter, &config.fetch);

        let mut coordinator = Self {
            seed,
            fetch_config: config.fetch.clone(),
            max_concurrency: config.crawler.max_concurrency.max(1),
            use_sitemaps: config.crawler.use_sitemaps,
            robots,
            fetcher,
            shutdown: None,
        };

        if config.fetch.render_fallback {
            coordinator = coordinator.with_default_renderer()?;
        }

        Ok(coordinator)
    }

    /// Enables rendered escalation with the given renderer
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.fetcher = self.fetcher.with_renderer(renderer);
        self
    }

    /// Stops dispatch once `true` is sent on the channel
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    #[cfg(feature = "headless")]
    fn with_default_renderer(self) -> Result<Self, CrawlError> {
        let renderer = crate::crawler::render::HeadlessRenderer::launch()?;
        Ok(self.with_renderer(Arc::new(renderer)))
    }

    #[cfg(not(feature = "headless"))]
    fn with_default_renderer(self) -> Result<Self, CrawlError> {
        tracing::warn!(
            "render-fallback is enabled but this build has no `headless` feature; \
             thin pages will not be rendered"
        );
        Ok(self)
    }

    /// Runs the crawl to completion and returns its report
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The crawl finished (per-page failures are skips)
    /// * `Err(CrawlError)` - The seed URL could not be reached at all
    pub async fn run(self) -> Result<CrawlReport, CrawlError> {
        let started_at = Utc::now();
        let seed_url = normalize_parsed(self.seed.root_url.clone())?;
        let max_pages = self.seed.max_pages;

        tracing::info!(
            "Starting crawl of {} (max {} pages, depth {}, delay {:?}, concurrency {}, rendering {})",
            seed_url,
            max_pages,
            self.seed.max_depth,
            self.seed.crawl_delay(),
            self.max_concurrency,
            if self.fetcher.has_renderer() { "on" } else { "off" }
        );

        let frontier = Arc::new(Frontier::new(&seed_url, self.seed.max_depth));
        frontier.offer(seed_url.clone(), 0, None);

        let context = Arc::new(WorkerContext {
            frontier: Arc::clone(&frontier),
            robots: self.robots,
            fetcher: self.fetcher,
            fetch_config: self.fetch_config,
            respect_robots: self.seed.respect_robots,
        });

        if self.use_sitemaps && self.seed.max_depth >= 1 {
            seed_from_sitemaps(&context, &seed_url, max_pages).await;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut shutdown = self.shutdown;
        let mut tasks: JoinSet<Completed> = JoinSet::new();
        // Entry held by each running task, so a failed task still gets a record
        let mut in_flight: HashMap<Id, FrontierEntry> = HashMap::new();
        let mut pages: Vec<(u64, PageRecord)> = Vec::new();
        let mut skipped: Vec<(u64, SkippedUrl)> = Vec::new();
        let mut pages_fetched = 0usize;

        let stop_reason = loop {
            if is_cancelled(&shutdown) {
                tracing::info!("Cancellation requested, draining {} in-flight fetches", tasks.len());
                break StopReason::Cancelled;
            }

            // Dispatch while the budget allows: in-flight fetches count
            // against it so a late success is never thrown away
            while pages.len() + tasks.len() < max_pages {
                let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                    break;
                };
                let Some(entry) = frontier.next() else {
                    break;
                };

                tracing::debug!("Dispatching {} (depth {})", entry.url, entry.depth);
                let context = Arc::clone(&context);
                let task_entry = entry.clone();
                let handle = tasks.spawn(async move {
                    let completed = process_entry(&context, task_entry).await;
                    drop(permit);
                    completed
                });
                in_flight.insert(handle.id(), entry);
            }

            if tasks.is_empty() {
                break if pages.len() >= max_pages {
                    StopReason::BudgetReached
                } else {
                    StopReason::FrontierExhausted
                };
            }

            tokio::select! {
                joined = tasks.join_next_with_id() => {
                    let Some(joined) = joined else { continue };
                    let Some(completed) = settle(joined, &mut in_flight) else { continue };
                    check_seed(&completed)?;
                    record(&frontier, completed, &mut pages, &mut skipped, &mut pages_fetched);

                    if pages.len() % 10 == 0 && !pages.is_empty() {
                        tracing::info!(
                            "Progress: {} pages recorded, {} skipped, {} in frontier, {} in flight",
                            pages.len(),
                            skipped.len(),
                            frontier.len(),
                            tasks.len()
                        );
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => {}
            }
        };

        // Graceful drain: in-flight fetches finish, nothing new is dispatched
        while let Some(joined) = tasks.join_next_with_id().await {
            if let Some(completed) = settle(joined, &mut in_flight) {
                check_seed(&completed)?;
                record(&frontier, completed, &mut pages, &mut skipped, &mut pages_fetched);
            }
        }

        let detail = match stop_reason {
            StopReason::Cancelled => "crawl cancelled",
            _ => "page budget reached",
        };
        for entry in frontier.drain_remaining() {
            skipped.push((
                entry.sequence,
                SkippedUrl {
                    url: entry.url.to_string(),
                    reason: SkipReason::BudgetExhausted,
                    detail: Some(detail.to_string()),
                    depth: Some(entry.depth),
                },
            ));
        }

        pages.sort_by_key(|(sequence, _)| *sequence);
        skipped.sort_by_key(|(sequence, _)| *sequence);

        let report = CrawlReport {
            seed: self.seed,
            pages: pages.into_iter().map(|(_, page)| page).collect(),
            skipped: skipped
                .into_iter()
                .map(|(_, skip)| skip)
                .chain(frontier.rejections())
                .collect(),
            started_at,
            finished_at: Utc::now(),
            pages_fetched,
            stop_reason,
        };

        tracing::info!(
            "Crawl finished ({}): {} pages, {} skipped, {} fetches in {}s",
            report.stop_reason,
            report.pages.len(),
            report.skipped.len(),
            report.pages_fetched,
            report.duration().num_seconds()
        );

        Ok(report)
    }
}

/// Offers sitemap URLs at depth 1, after the seed
async fn seed_from_sitemaps(context: &WorkerContext, seed_url: &Url, limit: usize) {
    let (declared, crawl_delay) = if context.respect_robots {
        let policy = context.robots.resolve(seed_url).await;
        (policy.sitemaps().to_vec(), policy.crawl_delay())
    } else {
        (Vec::new(), None)
    };

    let candidates: Vec<Url> = sitemap_candidates(seed_url, &declared)
        .into_iter()
        .filter(|candidate| context.frontier.in_scope(candidate))
        .collect();

    let urls = collect_sitemap_urls(&context.fetcher, &candidates, crawl_delay, limit).await;
    let admitted = urls
        .into_iter()
        .filter(|url| {
            context.frontier.offer(url.clone(), 1, Some(seed_url))
                == crate::crawler::frontier::OfferOutcome::Admitted
        })
        .count();
    tracing::debug!("Admitted {} sitemap URLs", admitted);
}

/// Runs one popped entry through robots check, fetch and normalization
async fn process_entry(context: &WorkerContext, entry: FrontierEntry) -> Completed {
    let skip = |entry: FrontierEntry, reason: SkipReason, detail: String, fetched: bool| {
        let skipped = SkippedUrl {
            url: entry.url.to_string(),
            reason,
            detail: Some(detail),
            depth: Some(entry.depth),
        };
        Completed {
            entry,
            outcome: Outcome::Skipped(skipped),
            fetched,
            unreachable: None,
        }
    };

    let crawl_delay: Option<Duration> = if context.respect_robots {
        let policy = context.robots.resolve(&entry.url).await;
        if !is_allowed(&policy, &entry.url) {
            tracing::info!("URL {} disallowed by robots.txt", entry.url);
            return skip(entry, SkipReason::RobotsDisallowed, "disallowed by robots.txt".to_string(), false);
        }
        policy.crawl_delay()
    } else {
        None
    };

    let result = context.fetcher.fetch(&entry.url, crawl_delay).await;
    let unreachable = result
        .is_unreachable()
        .then(|| result.error.as_ref().map(|e| e.to_string()).unwrap_or_default());

    // A redirect may land on another site or on a page already visited
    if result.is_success() {
        if let Ok(final_url) = normalize_parsed(result.final_url.clone()) {
            if final_url != entry.url {
                if !context.frontier.in_scope(&final_url) {
                    return skip(
                        entry,
                        SkipReason::OutOfScope,
                        format!("redirected to {}", final_url),
                        true,
                    );
                }
                if !context.frontier.mark_visited(&final_url) {
                    return skip(
                        entry,
                        SkipReason::Duplicate,
                        format!("redirected to already visited {}", final_url),
                        true,
                    );
                }
            }
        }
    }

    let outcome = match normalize(result, &entry, &context.fetch_config) {
        Ok(page) => Outcome::Page(page),
        Err(skipped) => {
            tracing::debug!("Skipping {}: {}", skipped.url, skipped.reason);
            Outcome::Skipped(skipped)
        }
    };

    Completed {
        entry,
        outcome,
        fetched: true,
        unreachable,
    }
}

/// Turns a joined task into its completion record
///
/// A task that panicked or was aborted still accounts for its entry: it
/// becomes a `fetch_error` skip and, for the seed, an unreachable seed.
fn settle(
    joined: Result<(Id, Completed), JoinError>,
    in_flight: &mut HashMap<Id, FrontierEntry>,
) -> Option<Completed> {
    match joined {
        Ok((id, completed)) => {
            in_flight.remove(&id);
            Some(completed)
        }
        Err(error) => {
            let Some(entry) = in_flight.remove(&error.id()) else {
                tracing::error!("Fetch task failed: {}", error);
                return None;
            };
            let reason = task_failure_reason(error);
            tracing::error!("Fetch task for {} failed: {}", entry.url, reason);
            Some(task_failed(entry, reason))
        }
    }
}

fn task_failure_reason(error: JoinError) -> String {
    if error.is_cancelled() {
        return "fetch task cancelled".to_string();
    }
    let payload: Box<dyn Any + Send> = error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("fetch task panicked: {}", message)
}

fn task_failed(entry: FrontierEntry, reason: String) -> Completed {
    let skipped = SkippedUrl {
        url: entry.url.to_string(),
        reason: SkipReason::FetchError,
        detail: Some(reason.clone()),
        depth: Some(entry.depth),
    };
    Completed {
        entry,
        outcome: Outcome::Skipped(skipped),
        fetched: true,
        unreachable: Some(reason),
    }
}

/// Fails the crawl when the seed itself produced no response at all
fn check_seed(completed: &Completed) -> Result<(), CrawlError> {
    match (&completed.unreachable, completed.entry.depth) {
        (Some(reason), 0) => Err(CrawlError::SeedUnreachable {
            url: completed.entry.url.to_string(),
            reason: reason.clone(),
        }),
        _ => Ok(()),
    }
}

/// Adds a finished entry to the report and offers its links
fn record(
    frontier: &Frontier,
    completed: Completed,
    pages: &mut Vec<(u64, PageRecord)>,
    skipped: &mut Vec<(u64, SkippedUrl)>,
    pages_fetched: &mut usize,
) {
    if completed.fetched {
        *pages_fetched += 1;
    }

    let entry = completed.entry;
    match completed.outcome {
        Outcome::Page(page) => {
            for link in page.links.iter().filter_map(|l| Url::parse(l).ok()) {
                frontier.offer(link, entry.depth + 1, Some(&entry.url));
            }
            tracing::debug!("Recorded {} ({} words)", page.url, page.word_count);
            pages.push((entry.sequence, page));
        }
        Outcome::Skipped(skip) => skipped.push((entry.sequence, skip)),
    }
}

fn is_cancelled(shutdown: &Option<watch::Receiver<bool>>) -> bool {
    shutdown.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Resolves when the shutdown channel changes; never resolves without one
async fn wait_for_shutdown(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => {
            if rx.changed().await.is_err() {
                // Sender gone: cancellation can no longer be requested
                *shutdown = None;
            }
        }
        None => std::future::pending().await,
    }
}

/// Runs a complete crawl from a configuration
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `shutdown` - Optional cancellation signal
pub async fn run_crawl(
    config: &Config,
    shutdown: Option<watch::Receiver<bool>>,
) -> Result<CrawlReport, CrawlError> {
    let mut coordinator = Coordinator::new(config)?;
    if let Some(shutdown) = shutdown {
        coordinator = coordinator.with_shutdown(shutdown);
    }
    coordinator.run().await
}
