use url::{Host, Url};

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use respectful_crawler::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM:8080/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the key used for per-host politeness state: `host` or `host:port`
///
/// Two servers on the same machine but different ports are separate hosts
/// for rate limiting and robots.txt purposes.
pub fn host_key(url: &Url) -> Option<String> {
    let host = extract_host(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Returns the registrable domain (eTLD+1) of a URL's host
///
/// Uses the Public Suffix List, so `www.example.co.uk` yields `example.co.uk`.
/// IP addresses and hosts the list cannot split (e.g. `localhost`) are their
/// own registrable domain.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use respectful_crawler::url::registrable_domain;
///
/// let url = Url::parse("https://blog.example.co.uk/post").unwrap();
/// assert_eq!(registrable_domain(&url), Some("example.co.uk".to_string()));
/// ```
pub fn registrable_domain(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_lowercase();
            Some(
                psl::domain(domain.as_bytes())
                    .map(|d| String::from_utf8_lossy(d.as_bytes()).into_owned())
                    .unwrap_or(domain),
            )
        }
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(format!("[{}]", addr)),
    }
}

/// Checks whether two URLs belong to the same site (same registrable domain)
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (registrable_domain(a), registrable_domain(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
