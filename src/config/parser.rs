use crate::config::types::{Config, SeedRequest};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;
use url::Url;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use respectful_crawler::config::load_config;
///
/// let config = load_config(Path::new("crawl.toml")).unwrap();
/// println!("Max pages: {}", config.crawler.max_pages);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The CLI logs this fingerprint so two reports can be traced back to the
/// exact configuration that produced them.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

impl Config {
    /// Builds the immutable seed request for a crawl from this configuration
    pub fn seed_request(&self) -> Result<SeedRequest, ConfigError> {
        let root_url = Url::parse(&self.crawler.seed_url).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid seed URL '{}': {}",
                self.crawler.seed_url, e
            ))
        })?;

        Ok(SeedRequest {
            root_url,
            max_pages: self.crawler.max_pages,
            max_depth: self.crawler.max_depth,
            crawl_delay_ms: self.crawler.crawl_delay_ms,
            respect_robots: self.crawler.respect_robots,
            locale: self.crawler.locale.clone(),
        })
    }
}
