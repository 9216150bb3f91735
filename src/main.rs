//! respectful-crawler main entry point
//!
//! This is the command-line interface for the respectful crawler.

use anyhow::{bail, Context};
use clap::Parser;
use respectful_crawler::config::{load_config_with_hash, validate, Config};
use respectful_crawler::crawler::run_crawl;
use respectful_crawler::output::{print_summary, CrawlReport};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// respectful-crawler: a polite, bounded site walker
///
/// Crawls same-site pages from a seed URL while respecting robots.txt and a
/// per-host crawl delay, and writes a JSON crawl report for content analysis.
#[derive(Parser, Debug)]
#[command(name = "respectful-crawler")]
#[command(version)]
#[command(about = "A polite, bounded site crawler", long_about = None)]
struct Cli {
    /// Seed URL (required unless given in the config file)
    #[arg(value_name = "SEED_URL")]
    seed_url: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of page records
    #[arg(long, value_name = "N")]
    max_pages: Option<usize>,

    /// Maximum link depth from the seed
    #[arg(long, value_name = "N")]
    max_depth: Option<u32>,

    /// Minimum delay between requests to one host, in milliseconds
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Number of concurrent fetches
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Do not fetch or obey robots.txt
    #[arg(long)]
    ignore_robots: bool,

    /// Locale sent as Accept-Language (e.g. en-GB)
    #[arg(long, value_name = "LOCALE")]
    locale: Option<String>,

    /// Render thin pages in a headless browser
    #[arg(long)]
    render: bool,

    /// Where to write the JSON report
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Print the summary of an existing report file and exit
    #[arg(long, value_name = "REPORT", conflicts_with = "dry_run")]
    stats: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if let Some(report_path) = &cli.stats {
        return handle_stats(report_path);
    }

    let config = build_config(&cli)?;
    validate(&config).context("Invalid configuration")?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config, cli.quiet).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("respectful_crawler=info,warn"),
            1 => EnvFilter::new("respectful_crawler=debug,info"),
            2 => EnvFilter::new("respectful_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the config file (if any) and applies command-line overrides
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => match &cli.seed_url {
            Some(seed) => Config::for_seed(seed),
            None => bail!("Give a seed URL or a --config file"),
        },
    };

    if let Some(seed) = &cli.seed_url {
        config.crawler.seed_url = seed.clone();
    }
    if let Some(max_pages) = cli.max_pages {
        config.crawler.max_pages = max_pages;
    }
    if let Some(max_depth) = cli.max_depth {
        config.crawler.max_depth = max_depth;
    }
    if let Some(delay_ms) = cli.delay_ms {
        config.crawler.crawl_delay_ms = delay_ms;
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawler.max_concurrency = concurrency;
    }
    if cli.ignore_robots {
        config.crawler.respect_robots = false;
    }
    if let Some(locale) = &cli.locale {
        config.crawler.locale = locale.clone();
    }
    if cli.render {
        config.fetch.render_fallback = true;
    }
    if let Some(output) = &cli.output {
        config.output.report_path = output.display().to_string();
    }

    Ok(config)
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== respectful-crawler Dry Run ===\n");

    println!("Crawl:");
    println!("  Seed URL: {}", config.crawler.seed_url);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Crawl delay floor: {}ms", config.crawler.crawl_delay_ms);
    println!("  Concurrency: {}", config.crawler.max_concurrency);
    println!("  Respect robots.txt: {}", config.crawler.respect_robots);
    println!("  Locale: {}", config.crawler.locale);
    println!("  Use sitemaps: {}", config.crawler.use_sitemaps);

    println!("\nFetch:");
    println!("  Timeout: {}ms", config.fetch.timeout_ms);
    println!("  robots.txt timeout: {}ms", config.fetch.robots_timeout_ms);
    println!("  Minimum text length: {}", config.fetch.min_text_length);
    println!("  Render fallback: {}", config.fetch.render_fallback);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Report: {}", config.output.report_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: summarizes an existing report
fn handle_stats(report_path: &Path) -> anyhow::Result<()> {
    let report = CrawlReport::read_json(report_path)
        .with_context(|| format!("Failed to read report {}", report_path.display()))?;

    println!("Report: {}", report_path.display());
    println!("Seed: {}\n", report.seed.root_url);
    print_summary(&report);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, quiet: bool) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight fetches");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = match run_crawl(&config, Some(shutdown_rx)).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    let report_path = Path::new(&config.output.report_path);
    report
        .write_json(report_path)
        .with_context(|| format!("Failed to write report {}", report_path.display()))?;
    tracing::info!("Report written to {}", report_path.display());

    if !quiet {
        print_summary(&report);
    }

    Ok(())
}
