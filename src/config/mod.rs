//! Configuration module
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and turning them into the immutable [`SeedRequest`] a crawl runs on.
//!
//! # Example
//!
//! ```no_run
//! use respectful_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! let seed = config.seed_request().unwrap();
//! println!("Crawling {} up to {} pages", seed.root_url, seed.max_pages);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, FetchConfig, OutputConfig, SeedRequest, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, validate_seed, MAX_CONCURRENCY};
