//! Sliding-window rate limiting for outbound API calls
//!
//! Both upstream services quota per-minute-with-bursts, which a single
//! token bucket cannot express: a bucket that allows 15/min will happily
//! release all 15 in the same second. Each limiter therefore keeps two
//! sliding windows — a long window (`max_per_window` over `window`) and an
//! optional short burst window (`burst_max` over `burst_window`) — and a
//! grant must fit inside both.
//!
//! Limiters are process-wide by necessity (they ARE the shared quota
//! accounting) but never free-standing singletons: the composition root
//! builds a [`LimiterSet`] and injects it, so tests can substitute
//! unbounded limiters.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivelens_limiter::{LimiterConfig, SlidingWindowLimiter};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let limiter = SlidingWindowLimiter::new(LimiterConfig {
//!     max_per_window: 15,
//!     window: Duration::from_secs(60),
//!     burst_max: Some(5),
//!     burst_window: Duration::from_secs(1),
//! });
//! limiter.acquire().await;
//! // ... make API call ...
//! # }
//! ```

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::debug;

/// Error returned by [`SlidingWindowLimiter::acquire_timeout`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// The deadline passed before both windows had capacity
    #[error("Rate limit wait exhausted after {waited_ms} ms")]
    Exhausted {
        /// Total time spent waiting
        waited_ms: u128,
    },
}

/// Configuration for one sliding-window limiter
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Grants allowed inside the long window
    pub max_per_window: u32,
    /// Length of the long window
    pub window: Duration,
    /// Grants allowed inside the burst window (None disables the burst cap)
    pub burst_max: Option<u32>,
    /// Length of the burst window
    pub burst_window: Duration,
}

impl LimiterConfig {
    /// Per-minute limiter without a burst cap
    pub fn per_minute(max: u32) -> Self {
        Self {
            max_per_window: max,
            window: Duration::from_secs(60),
            burst_max: None,
            burst_window: Duration::from_secs(1),
        }
    }

    /// Per-minute limiter with a per-second burst cap
    pub fn per_minute_with_burst(max: u32, burst: u32) -> Self {
        Self {
            max_per_window: max,
            window: Duration::from_secs(60),
            burst_max: Some(burst),
            burst_window: Duration::from_secs(1),
        }
    }
}

/// Grant timestamps, pruned lazily on every check
#[derive(Debug, Default)]
struct LimiterInner {
    grants: VecDeque<Instant>,
}

impl LimiterInner {
    /// Drops grants older than the long window. The burst window is a
    /// suffix of the long one, so a single deque serves both.
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&front) = self.grants.front() {
            if now.duration_since(front) >= window {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }

    /// Grants recorded within the trailing `window`
    fn count_within(&self, now: Instant, window: Duration) -> usize {
        self.grants
            .iter()
            .rev()
            .take_while(|&&t| now.duration_since(t) < window)
            .count()
    }
}

/// Sliding-window counter with an optional short-window burst cap
///
/// `acquire()` blocks (asynchronously) until both windows have capacity,
/// then records the grant. Thread safety comes from an internal Mutex;
/// waiting happens outside the lock.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    config: LimiterConfig,
    inner: Mutex<LimiterInner>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter with the given configuration
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(LimiterInner::default()),
        }
    }

    /// A limiter that never blocks, for tests and tooling
    pub fn unbounded() -> Self {
        Self::new(LimiterConfig {
            max_per_window: u32::MAX,
            window: Duration::from_secs(1),
            burst_max: None,
            burst_window: Duration::from_secs(1),
        })
    }

    /// Attempts a grant without waiting. On refusal, returns the duration
    /// until the earliest instant capacity could free up.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        inner.prune(now, self.config.window);

        // Long window check
        if inner.grants.len() >= self.config.max_per_window as usize {
            // Capacity frees when the oldest grant leaves the window.
            let oldest = *inner.grants.front().unwrap();
            let free_at = oldest + self.config.window;
            return Err(free_at.saturating_duration_since(now));
        }

        // Burst window check
        if let Some(burst_max) = self.config.burst_max {
            let in_burst = inner.count_within(now, self.config.burst_window);
            if in_burst >= burst_max as usize {
                let idx = inner.grants.len() - in_burst;
                let oldest_in_burst = inner.grants[idx];
                let free_at = oldest_in_burst + self.config.burst_window;
                return Err(free_at.saturating_duration_since(now));
            }
        }

        inner.grants.push_back(now);
        Ok(())
    }

    /// Blocks until both windows have capacity, then records the grant
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    let wait = wait.max(Duration::from_millis(10));
                    debug!(wait_ms = wait.as_millis() as u64, "Rate limiter waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up once `timeout` has
    /// elapsed in total
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<(), LimiterError> {
        let started = Instant::now();
        loop {
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    let elapsed = started.elapsed();
                    if elapsed >= timeout {
                        return Err(LimiterError::Exhausted {
                            waited_ms: elapsed.as_millis(),
                        });
                    }
                    let remaining = timeout - elapsed;
                    let wait = wait.max(Duration::from_millis(10)).min(remaining);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Grants currently inside the long window
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        inner.prune(now, self.config.window);
        inner.grants.len()
    }
}

/// The process-wide pair of limiters, built once at the composition root
/// and injected into the adapters
#[derive(Debug, Clone)]
pub struct LimiterSet {
    /// Gates every captioning/embedding model call
    pub caption: Arc<SlidingWindowLimiter>,
    /// Gates every drive API call
    pub drive: Arc<SlidingWindowLimiter>,
}

impl LimiterSet {
    /// Builds a set from the two configurations
    pub fn new(caption: LimiterConfig, drive: LimiterConfig) -> Self {
        Self {
            caption: Arc::new(SlidingWindowLimiter::new(caption)),
            drive: Arc::new(SlidingWindowLimiter::new(drive)),
        }
    }

    /// A set that never blocks, for tests
    pub fn unbounded() -> Self {
        Self {
            caption: Arc::new(SlidingWindowLimiter::unbounded()),
            drive: Arc::new(SlidingWindowLimiter::unbounded()),
        }
    }
}
