use std::future::Future;

use crate::Result;

/// Clock in milliseconds; injectable so TTL expiry is testable.
pub type Clock = Box<dyn Fn() -> f64 + Send>;

/// Short-TTL memo of the worker's current navigation id, collapsing the
/// repeated staleness checks within one command execution into a single
/// IPC round trip.
pub struct NavigationMemo {
    ttl_ms: f64,
    clock: Clock,
    cached: Option<(u64, f64)>,
}

pub const DEFAULT_TTL_MS: f64 = 2000.0;

impl NavigationMemo {
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_TTL_MS, Box::new(system_now_ms))
    }

    pub fn with_clock(ttl_ms: f64, clock: Clock) -> Self {
        Self {
            ttl_ms,
            clock,
            cached: None,
        }
    }

    /// The current navigation id, fetching through `fetch` only when the
    /// memo is empty or expired.
    pub async fn current<F, Fut>(&mut self, fetch: F) -> Result<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64>>,
    {
        let now = (self.clock)();
        if let Some((value, fetched_at)) = self.cached
            && now - fetched_at < self.ttl_ms
        {
            return Ok(value);
        }
        let value = fetch().await?;
        self.cached = Some((value, now));
        Ok(value)
    }
}

impl Default for NavigationMemo {
    fn default() -> Self {
        Self::new()
    }
}

fn system_now_ms() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}
