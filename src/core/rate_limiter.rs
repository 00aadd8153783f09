// src/core/rate_limiter.rs

//! Sliding-window admission control.
//!
//! Each key keeps the instants of its admitted requests inside the trailing
//! window. A check prunes expired instants, compares the remainder with the
//! limit and, if there is room, records the new request. The whole
//! check-then-append runs under one lock, so concurrent requests for the same
//! key cannot both squeeze into the last slot.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScannerConfig;
use crate::core::error::ScanError;
use crate::core::models::{Caller, Tier};

/// One sliding-window limiter. Cloning shares the underlying table.
#[derive(Clone)]
pub struct RateLimiter {
    name: &'static str,
    limit: usize,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, limit: usize, window: Duration) -> Self {
        Self {
            name,
            limit,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admits or rejects a request for `key` at the current instant.
    pub fn admit(&self, key: &str) -> Result<(), ScanError> {
        self.admit_at(key, Instant::now())
    }

    /// Same as [`admit`](Self::admit) with an explicit clock reading.
    pub fn admit_at(&self, key: &str, now: Instant) -> Result<(), ScanError> {
        let mut windows = self.windows.lock();
        let entries = windows.entry(key.to_string()).or_default();
        prune(entries, now, self.window);

        if entries.len() < self.limit {
            entries.push_back(now);
            debug!(limiter = self.name, key, used = entries.len(), limit = self.limit, "Request admitted.");
            return Ok(());
        }

        Err(self.refusal(key, entries, now))
    }

    fn refusal(&self, key: &str, entries: &VecDeque<Instant>, now: Instant) -> ScanError {
        // The oldest surviving entry is the next to leave the window.
        let retry_after = entries
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(self.window);
        warn!(limiter = self.name, key, retry_after_secs = retry_after.as_secs(), "Request rate limited.");
        ScanError::RateLimited { retry_after }
    }

    /// Admits one request into several limiters at once, or into none of them.
    ///
    /// Every table is locked in the order given for the whole check-and-record,
    /// so callers must always pass the same limiters in the same order, and
    /// never the same table twice. On refusal the index of the first full
    /// limiter comes back with its error.
    pub fn admit_all_at(gates: &[(&RateLimiter, &str)], now: Instant) -> Result<(), (usize, ScanError)> {
        let mut tables: Vec<_> = gates.iter().map(|(limiter, _)| limiter.windows.lock()).collect();

        for (index, ((limiter, key), table)) in gates.iter().zip(tables.iter_mut()).enumerate() {
            let entries = table.entry(key.to_string()).or_default();
            prune(entries, now, limiter.window);
            if entries.len() >= limiter.limit {
                return Err((index, limiter.refusal(key, entries, now)));
            }
        }
        for ((limiter, key), table) in gates.iter().zip(tables.iter_mut()) {
            let entries = table.entry(key.to_string()).or_default();
            entries.push_back(now);
            debug!(limiter = limiter.name, key, used = entries.len(), limit = limiter.limit, "Request admitted.");
        }
        Ok(())
    }

    /// Requests currently counted against `key`, without recording a new one.
    pub fn in_window(&self, key: &str, now: Instant) -> usize {
        let mut windows = self.windows.lock();
        match windows.get_mut(key) {
            Some(entries) => {
                prune(entries, now, self.window);
                entries.len()
            }
            None => 0,
        }
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }

    /// Prunes every key and drops those with nothing left in the window.
    /// Returns how many keys were evicted.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, entries| {
            prune(entries, now, self.window);
            !entries.is_empty()
        });
        before - windows.len()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }
}

fn prune(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = entries.front() {
        if now.saturating_duration_since(*oldest) >= window {
            entries.pop_front();
        } else {
            break;
        }
    }
}

/// The two independent scan limiters: authenticated users and public callers.
#[derive(Clone)]
pub struct RateLimiters {
    authenticated: RateLimiter,
    public: RateLimiter,
}

impl RateLimiters {
    pub fn new(authenticated: RateLimiter, public: RateLimiter) -> Self {
        Self { authenticated, public }
    }

    pub fn from_config(config: &ScannerConfig) -> Self {
        Self::new(
            RateLimiter::new("authenticated", config.user_scan_limit, config.user_window()),
            RateLimiter::new("public", config.public_scan_limit, config.public_window()),
        )
    }

    pub fn for_tier(&self, tier: Tier) -> &RateLimiter {
        match tier {
            Tier::Authenticated => &self.authenticated,
            Tier::Public => &self.public,
        }
    }

    /// Charges one scan to the caller's tier, keyed by user id or client IP.
    pub fn admit(&self, caller: &Caller) -> Result<(), ScanError> {
        self.for_tier(caller.tier()).admit(&caller.rate_key())
    }

    pub fn sweep(&self) -> usize {
        self.authenticated.sweep() + self.public.sweep()
    }

    /// Starts a background task that sweeps both tables every `interval` until
    /// `cancel` fires.
    pub fn spawn_sweeper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let limiters = self.clone();
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Rate limiter sweeper started.");
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = limiters.sweep();
                        if evicted > 0 {
                            debug!(evicted, "Swept idle rate limiter keys.");
                        }
                    }
                }
            }
            info!("Rate limiter sweeper stopped.");
        })
    }
}
