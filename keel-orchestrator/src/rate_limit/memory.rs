//! In-memory rate limit store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{RateLimitError, RateLimitStore};

#[derive(Debug, Clone, Copy)]
struct Window {
    start: i64,
    count: u32,
}

#[derive(Debug, Default)]
struct Counters {
    /// Newest window start seen; counters older than it are stale
    current: i64,
    windows: HashMap<String, Window>,
}

/// Process-local window counters
///
/// Stale counters are dropped once per window, when the first hit of a newer
/// window arrives. The lock is held only for the counter update and never
/// across an await.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: Mutex<Counters>,
}

impl MemoryStore {
    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .windows
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(
        &self,
        key: &str,
        window_start: i64,
        limit: u32,
    ) -> Result<Option<u32>, RateLimitError> {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);

        if window_start > counters.current {
            counters.current = window_start;
            counters.windows.retain(|_, window| window.start >= window_start);
        }

        let window = counters.windows.entry(key.to_string()).or_insert(Window {
            start: window_start,
            count: 0,
        });

        if window.start < window_start {
            *window = Window {
                start: window_start,
                count: 0,
            };
        }

        if window.count >= limit {
            return Ok(None);
        }

        window.count += 1;
        Ok(Some(window.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hit_counts_until_limit() {
        let store = MemoryStore::default();
        assert_eq!(store.hit("k", 60, 2).await.unwrap(), Some(1));
        assert_eq!(store.hit("k", 60, 2).await.unwrap(), Some(2));
        assert_eq!(store.hit("k", 60, 2).await.unwrap(), None);
        assert_eq!(store.hit("k", 120, 2).await.unwrap(), Some(1));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_windows_are_pruned_when_window_advances() {
        let store = MemoryStore::default();
        for i in 0..100 {
            store.hit(&format!("client-{}", i), 60, 1).await.unwrap();
        }
        assert_eq!(store.len(), 100);

        store.hit("fresh", 120, 1).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_no_pruning_within_a_window() {
        let store = MemoryStore::default();
        store.hit("a", 120, 1).await.unwrap();
        // a late hit for an older window is kept until the next advance
        store.hit("late", 60, 1).await.unwrap();
        store.hit("b", 120, 1).await.unwrap();
        assert_eq!(store.len(), 3);

        store.hit("c", 180, 1).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
