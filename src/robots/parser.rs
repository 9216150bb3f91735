//! Robots.txt parser implementation
//!
//! Parses `User-agent` groups with their `Allow`, `Disallow` and `Crawl-delay`
//! directives, selects the group that applies to our product token, and
//! answers allow/deny questions with longest-match precedence.

use std::time::Duration;

/// Longest `Crawl-delay` honored; larger declared values are capped to it
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(300);

/// Whether a rule grants or denies access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Allow,
    Disallow,
}

/// A single Allow/Disallow rule from the applicable group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub kind: RuleKind,
    /// Path pattern, may contain `*` wildcards and a trailing `$` anchor
    pub pattern: String,
}

impl Rule {
    /// Returns the matched length if the pattern matches the path
    ///
    /// Precedence uses the pattern length (minus a trailing `$`), which equals
    /// the matched prefix length for plain prefix rules.
    fn match_len(&self, path: &str) -> Option<usize> {
        if pattern_matches(&self.pattern, path) {
            Some(self.pattern.trim_end_matches('$').len())
        } else {
            None
        }
    }
}

/// The rule set that applies to this crawler for one host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRobots {
    /// Rules from the selected group (specific agent, or wildcard fallback)
    pub rules: Vec<Rule>,

    /// Declared crawl delay from the selected group
    pub crawl_delay: Option<Duration>,

    /// Sitemap URLs declared anywhere in the file
    pub sitemaps: Vec<String>,
}

/// One `User-agent` group while parsing
#[derive(Debug, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
    crawl_delay: Option<Duration>,
}

impl ParsedRobots {
    /// Creates a permissive rule set that allows everything
    ///
    /// This is the default when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parses robots.txt content for the given product token
    ///
    /// Groups naming the token (case-insensitive) are merged and used; if none
    /// name it, the `*` groups are used; if neither exist everything is allowed.
    pub fn parse(content: &str, product_token: &str) -> Self {
        let token = product_token.to_lowercase();
        let mut groups: Vec<Group> = Vec::new();
        let mut sitemaps = Vec::new();
        // A User-agent line after rules starts a new group
        let mut collecting_agents = false;

        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            }
            .trim();

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        groups.push(Group::default());
                        collecting_agents = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    collecting_agents = false;
                    let Some(group) = groups.last_mut() else {
                        continue;
                    };
                    // An empty Disallow means "allow everything" and adds no rule
                    if value.is_empty() {
                        continue;
                    }
                    let kind = if key == "allow" {
                        RuleKind::Allow
                    } else {
                        RuleKind::Disallow
                    };
                    group.rules.push(Rule {
                        kind,
                        pattern: value.to_string(),
                    });
                }
                "crawl-delay" => {
                    collecting_agents = false;
                    if let (Some(group), Some(delay)) = (groups.last_mut(), parse_crawl_delay(value)) {
                        group.crawl_delay = Some(delay);
                    }
                }
                "sitemap" => {
                    if !value.is_empty() {
                        sitemaps.push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        let matches_token = |agent: &str| agent != "*" && agent == token;

        let mut selected: Vec<&Group> = groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| matches_token(a)))
            .collect();
        if selected.is_empty() {
            selected = groups
                .iter()
                .filter(|g| g.agents.iter().any(|a| a == "*"))
                .collect();
        }

        let rules = selected
            .iter()
            .flat_map(|g| g.rules.iter().cloned())
            .collect();
        let crawl_delay = selected.iter().find_map(|g| g.crawl_delay);

        Self {
            rules,
            crawl_delay,
            sitemaps,
        }
    }

    /// Checks whether a path (with optional query) may be fetched
    ///
    /// The rule with the longest matching pattern wins regardless of kind;
    /// on a tie Allow wins. No matching rule means allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        if path == "/robots.txt" {
            return true;
        }

        let mut best: Option<(usize, RuleKind)> = None;
        for rule in &self.rules {
            let Some(len) = rule.match_len(path) else {
                continue;
            };
            best = match best {
                None => Some((len, rule.kind)),
                Some((best_len, _)) if len > best_len => Some((len, rule.kind)),
                Some((best_len, _)) if len == best_len && rule.kind == RuleKind::Allow => {
                    Some((len, RuleKind::Allow))
                }
                keep => keep,
            };
        }

        !matches!(best, Some((_, RuleKind::Disallow)))
    }
}

/// Parses a `Crawl-delay` value in seconds, capped at [`MAX_CRAWL_DELAY`]
///
/// Negative and non-numeric values are ignored.
fn parse_crawl_delay(value: &str) -> Option<Duration> {
    let secs: f64 = value.parse().ok()?;
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    match Duration::try_from_secs_f64(secs) {
        Ok(delay) if delay <= MAX_CRAWL_DELAY => Some(delay),
        _ => {
            tracing::warn!(
                "Crawl-delay {} exceeds {}s, capping it",
                value,
                MAX_CRAWL_DELAY.as_secs()
            );
            Some(MAX_CRAWL_DELAY)
        }
    }
}

/// Matches a robots.txt path pattern against a path
///
/// `*` matches any run of characters; a trailing `$` anchors the end.
/// Without `$` the pattern is a prefix match.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0;

    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            if !path.starts_with(part) {
                return false;
            }
            pos = part.len();
            continue;
        }

        let is_last = i == parts.len() - 1;
        if is_last && anchored {
            // The final literal must sit at the very end, after `pos`
            return path.len() >= pos + part.len() && path.ends_with(part);
        }

        match path[pos..].find(part) {
            Some(offset) => pos += offset + part.len(),
            None => return false,
        }
    }

    !anchored || pos == path.len()
}
