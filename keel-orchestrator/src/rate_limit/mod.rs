//! Fixed-window rate limiting
//!
//! [`RateLimiter`] counts requests per key in windows aligned to multiples of
//! the window length since the Unix epoch, so every instance agrees on where a
//! window starts. Counters live behind a [`RateLimitStore`]: [`MemoryStore`]
//! for a single instance, [`PostgresStore`] when several instances share one
//! budget. A rejected request is not counted.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::RateLimitConfig;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Outcome of one acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    /// Acquisitions left in the current window
    pub remaining: u32,
    /// Time until the current window ends
    pub reset_after: Duration,
}

/// Storage for per-key window counters
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one hit for `key` in the window starting at `window_start` (Unix
    /// seconds) unless `limit` hits are already counted there.
    ///
    /// Returns the count after the hit, or `None` when the hit was rejected.
    /// A counter from an earlier window is reset.
    async fn hit(&self, key: &str, window_start: i64, limit: u32)
    -> Result<Option<u32>, RateLimitError>;
}

/// Front-end over a [`RateLimitStore`]
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    /// Try to take one slot for `key` in the current window
    pub async fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<Decision, RateLimitError> {
        self.try_acquire_at(key, limit, window, Utc::now()).await
    }

    /// [`try_acquire`](Self::try_acquire) with an explicit clock reading
    pub async fn try_acquire_at(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Decision, RateLimitError> {
        let (window_start, reset_after) = window_bounds(window, now);

        let decision = match self.store.hit(key, window_start, limit).await? {
            Some(count) => Decision {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(count),
                reset_after,
            },
            None => Decision {
                allowed: false,
                limit,
                remaining: 0,
                reset_after,
            },
        };

        Ok(decision)
    }
}

/// Longest window a limiter accepts; longer windows are clamped to it
pub const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Start of the window containing `now` (Unix seconds) and time left in it
fn window_bounds(window: Duration, now: DateTime<Utc>) -> (i64, Duration) {
    let window_ms = window.as_secs().clamp(1, MAX_WINDOW.as_secs()) as i64 * 1000;
    let now_ms = now.timestamp_millis();
    let start_ms = now_ms.div_euclid(window_ms) * window_ms;
    let reset_ms = (start_ms + window_ms - now_ms).unsigned_abs();
    (start_ms / 1000, Duration::from_millis(reset_ms))
}

// =============================================================================
// Endpoint Policy
// =============================================================================

/// Limits per path prefix, plus the window they apply to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub default_limit: u32,
    pub endpoints: Vec<(String, u32)>,
    /// Key clients by the first `X-Forwarded-For` hop instead of the peer
    pub trust_forwarded_for: bool,
}

impl RateLimitPolicy {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            window: config.window,
            default_limit: config.default_limit,
            endpoints: config.endpoints.clone(),
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }

    /// Endpoint key and limit for a request path
    ///
    /// The longest prefix that matches on a segment boundary wins; a path no
    /// prefix covers is its own endpoint with the default limit.
    pub fn resolve<'a>(&'a self, path: &'a str) -> (&'a str, u32) {
        self.endpoints
            .iter()
            .filter(|(prefix, _)| covers(prefix, path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, limit)| (prefix.as_str(), *limit))
            .unwrap_or((path, self.default_limit))
    }
}

fn covers(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
