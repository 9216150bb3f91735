//! URL handling module
//!
//! This module provides URL canonicalization (the frontier's uniqueness key),
//! host extraction for per-host politeness state, and registrable-domain
//! scope checks.

mod domain;
mod normalize;

pub use domain::{extract_host, host_key, registrable_domain, same_site};
pub use normalize::{normalize_parsed, normalize_url};

use ::url::Url;

/// Returns the origin (`scheme://host[:port]`) of a URL, used to locate robots.txt
pub fn origin_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Returns the path plus query of a URL, the part robots.txt rules match against
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    }
}
