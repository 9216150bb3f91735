//! Per-host politeness enforcement
//!
//! Every fetch start on a host reserves the next permitted instant under a
//! short lock, then sleeps until that instant with the lock released. Two
//! reservations on the same host are always at least `delay` apart, while
//! reservations on different hosts never wait on each other.

use crate::robots::MAX_CRAWL_DELAY;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks the politeness state of one host
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Start instant of the most recent reserved fetch
    pub last_fetch_start: Option<Instant>,

    /// Number of fetch slots handed out for this host
    pub request_count: u32,
}

impl HostState {
    /// Computes the earliest instant a new fetch may start
    ///
    /// # Arguments
    ///
    /// * `delay` - The effective minimum interval between fetch starts
    /// * `now` - The current time instant
    pub fn next_permitted(&self, delay: Duration, now: Instant) -> Instant {
        match self.last_fetch_start {
            Some(last) => match last.checked_add(delay) {
                Some(at) => std::cmp::max(now, at),
                None => now + MAX_CRAWL_DELAY,
            },
            None => now,
        }
    }

    /// Returns the time until the next fetch may start, or None if it may start now
    pub fn time_until_next_request(&self, delay: Duration, now: Instant) -> Option<Duration> {
        let at = self.next_permitted(delay, now);
        (at > now).then(|| at - now)
    }

    fn reserve(&mut self, delay: Duration, now: Instant) -> Instant {
        let at = self.next_permitted(delay, now);
        self.last_fetch_start = Some(at);
        self.request_count += 1;
        at
    }
}

/// Serializes fetch starts per host
pub struct RateLimiter {
    /// Configured floor for the delay between fetch starts
    floor: Duration,
    hosts: Mutex<HashMap<String, HostState>>,
}

impl RateLimiter {
    /// Creates a rate limiter with the configured delay floor
    pub fn new(floor: Duration) -> Self {
        Self {
            floor,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// The effective delay: `max(floor, declared crawl-delay)`
    ///
    /// The declared delay is capped at [`MAX_CRAWL_DELAY`].
    pub fn effective_delay(&self, declared: Option<Duration>) -> Duration {
        let declared = declared.unwrap_or(Duration::ZERO).min(MAX_CRAWL_DELAY);
        std::cmp::max(self.floor, declared)
    }

    /// Suspends the caller until it may start a fetch on `host`
    ///
    /// The slot is consumed as soon as it is reserved, regardless of how the
    /// fetch turns out. Returns the instant the slot was granted for.
    pub async fn acquire(&self, host: &str, declared_delay: Option<Duration>) -> Instant {
        let delay = self.effective_delay(declared_delay);

        let start_at = {
            let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
            let state = hosts.entry(host.to_string()).or_default();
            state.reserve(delay, Instant::now())
        };

        let now = Instant::now();
        if start_at > now {
            tracing::trace!("Waiting {:?} for next slot on {}", start_at - now, host);
            tokio::time::sleep_until(start_at).await;
        }

        start_at
    }

    /// Returns a snapshot of one host's state
    pub fn host_state(&self, host: &str) -> Option<HostState> {
        self.hosts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(host)
            .cloned()
    }

    /// Number of distinct hosts seen so far
    pub fn host_count(&self) -> usize {
        self.hosts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
