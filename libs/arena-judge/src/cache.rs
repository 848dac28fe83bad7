// Expiring single-value cache with an injected clock
// Used for the engine's runtime list, which changes rarely

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct Entry<T> {
    value: T,
    fetched_at: DateTime<Utc>,
}

/// Holds one value and the time it was fetched
///
/// Construct once per process and share by reference. A failed refresh
/// leaves the previous value in place and returns the error.
pub struct ExpiringCache<T> {
    entry: Mutex<Option<Entry<T>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> ExpiringCache<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
            clock,
        }
    }

    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    /// The cached value if it has not expired
    pub async fn get(&self) -> Option<T> {
        let now = self.clock.now();
        let entry = self.entry.lock().await;
        entry
            .as_ref()
            .filter(|e| now - e.fetched_at < self.ttl)
            .map(|e| e.value.clone())
    }

    /// Return the cached value, fetching a new one when missing or expired
    ///
    /// The lock is held across `fetch`, so concurrent callers wait for a
    /// single refresh instead of each hitting the upstream.
    pub async fn get_or_refresh<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut entry = self.entry.lock().await;
        let now = self.clock.now();

        if let Some(current) = entry.as_ref() {
            if now - current.fetched_at < self.ttl {
                return Ok(current.value.clone());
            }
            debug!(fetched_at = %current.fetched_at, "Cached value expired");
        }

        let value = fetch().await?;
        *entry = Some(Entry {
            value: value.clone(),
            fetched_at: self.clock.now(),
        });
        Ok(value)
    }

    /// Drop the cached value so the next read refetches
    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }
}
