//! Crawl frontier: the queue plus visited-set
//!
//! All state lives behind one mutex so that "not yet seen" and "now seen"
//! are decided in the same critical section. The lock is never held across
//! an await.

use crate::output::{SkipReason, SkippedUrl};
use crate::url::{normalize_parsed, registrable_domain};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use url::Url;

/// A URL admitted to the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Canonical URL, the uniqueness key
    pub url: Url,

    /// Link distance from the seed (seed = 0)
    pub depth: u32,

    /// Page the link was found on, None for the seed
    pub discovered_from: Option<Url>,

    /// Discovery order, assigned when the entry is popped
    pub sequence: u64,
}

/// What the frontier did with an offered URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Queued for fetching
    Admitted,
    /// Already queued or visited
    Duplicate,
    /// Not http(s), or a different registrable domain
    OutOfScope,
    /// Deeper than the configured maximum
    DepthExceeded,
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<FrontierEntry>,
    /// Every URL ever admitted (queued or visited)
    seen: HashSet<String>,
    visited: HashSet<String>,
    /// Rejected offers, keyed by URL, with their first-rejection order
    rejected: HashMap<String, (u64, SkippedUrl)>,
    next_sequence: u64,
    rejection_count: u64,
}

/// Breadth-first crawl queue scoped to the seed's registrable domain
pub struct Frontier {
    scope: Option<String>,
    max_depth: u32,
    state: Mutex<FrontierState>,
}

impl Frontier {
    /// Creates an empty frontier scoped to the seed's registrable domain
    pub fn new(seed: &Url, max_depth: u32) -> Self {
        Self {
            scope: registrable_domain(seed),
            max_depth,
            state: Mutex::new(FrontierState::default()),
        }
    }

    /// Checks the scheme and registrable-domain scope rule
    pub fn in_scope(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && self.scope.is_some()
            && registrable_domain(url) == self.scope
    }

    /// Offers a discovered URL
    ///
    /// The URL is canonicalized first. Scope and depth rejections are
    /// recorded once per distinct URL; a `DepthExceeded` record is withdrawn
    /// if the same URL is admitted later from a shallower page.
    pub fn offer(&self, url: Url, depth: u32, from: Option<&Url>) -> OfferOutcome {
        let url = match normalize_parsed(url) {
            Ok(url) => url,
            Err(e) => {
                tracing::trace!("Dropping unnormalizable link: {}", e);
                return OfferOutcome::OutOfScope;
            }
        };
        let key = url.as_str().to_string();

        let mut state = self.lock();

        if !self.in_scope(&url) {
            self.record_rejection(&mut state, key, SkipReason::OutOfScope, depth, from);
            return OfferOutcome::OutOfScope;
        }
        if state.seen.contains(&key) {
            return OfferOutcome::Duplicate;
        }
        if depth > self.max_depth {
            self.record_rejection(&mut state, key, SkipReason::DepthExceeded, depth, from);
            return OfferOutcome::DepthExceeded;
        }

        if state
            .rejected
            .get(&key)
            .is_some_and(|(_, previous)| previous.reason == SkipReason::DepthExceeded)
        {
            state.rejected.remove(&key);
        }
        state.seen.insert(key);
        state.queue.push_back(FrontierEntry {
            url,
            depth,
            discovered_from: from.cloned(),
            sequence: 0,
        });

        OfferOutcome::Admitted
    }

    /// Pops the oldest queued entry and marks it visited
    pub fn next(&self) -> Option<FrontierEntry> {
        let mut state = self.lock();
        let mut entry = state.queue.pop_front()?;
        entry.sequence = state.next_sequence;
        state.next_sequence += 1;
        state.visited.insert(entry.url.as_str().to_string());
        Some(entry)
    }

    /// Marks a URL visited without fetching it (e.g. a redirect target)
    ///
    /// Returns true if the URL was not visited before. A queued copy of the
    /// URL is removed so it is not fetched a second time. Calling this again
    /// has no further effect.
    pub fn mark_visited(&self, url: &Url) -> bool {
        let key = match normalize_parsed(url.clone()) {
            Ok(url) => url.as_str().to_string(),
            Err(_) => url.as_str().to_string(),
        };

        let mut state = self.lock();
        if !state.visited.insert(key.clone()) {
            return false;
        }
        state.seen.insert(key.clone());
        state.queue.retain(|entry| entry.url.as_str() != key);
        true
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.lock().visited.contains(url.as_str())
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn visited_count(&self) -> usize {
        self.lock().visited.len()
    }

    /// Pops every remaining entry in order
    ///
    /// Used when the budget stops dispatch: drained entries count as popped
    /// and are reported as `budget_exhausted`.
    pub fn drain_remaining(&self) -> Vec<FrontierEntry> {
        let mut drained = Vec::new();
        while let Some(entry) = self.next() {
            drained.push(entry);
        }
        drained
    }

    /// Returns the recorded scope and depth rejections in first-seen order
    pub fn rejections(&self) -> Vec<SkippedUrl> {
        let state = self.lock();
        let mut rejected: Vec<_> = state.rejected.values().cloned().collect();
        rejected.sort_by_key(|(order, _)| *order);
        rejected.into_iter().map(|(_, skipped)| skipped).collect()
    }

    fn record_rejection(
        &self,
        state: &mut FrontierState,
        key: String,
        reason: SkipReason,
        depth: u32,
        from: Option<&Url>,
    ) {
        if state.rejected.contains_key(&key) || state.seen.contains(&key) {
            return;
        }

        let detail = match (reason, from) {
            (SkipReason::DepthExceeded, _) => format!("depth {} > max depth {}", depth, self.max_depth),
            (_, Some(from)) => format!("linked from {}", from),
            (_, None) => "outside the seed's registrable domain".to_string(),
        };
        let order = state.rejection_count;
        state.rejection_count += 1;
        state.rejected.insert(
            key.clone(),
            (
                order,
                SkippedUrl {
                    url: key,
                    reason,
                    detail: Some(detail),
                    depth: Some(depth),
                },
            ),
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
