// =============================================================================
// Global FIFO Queue / Per-Venue Throttle (C3)
// =============================================================================
//
// The source serializes venue requests through a chained promise queue; in
// this systems-language rewrite that becomes a per-venue async mutex (the
// "token") guarding the last-dispatch `Instant`, which both FIFO-orders
// waiters (tokio's mutex wakes them in acquire order) and enforces the
// minimum inter-request gap (§5, §9 design note).
// =============================================================================

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// One instance per venue; cloning shares the same underlying chain.
pub struct VenueThrottle {
    venue: &'static str,
    min_gap: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl VenueThrottle {
    pub fn new(venue: &'static str, min_gap_ms: u64) -> Self {
        Self {
            venue,
            min_gap: Duration::from_millis(min_gap_ms),
            last_dispatch: Mutex::new(None),
        }
    }

    /// Block until it is this caller's turn and at least `min_gap` has
    /// elapsed since the previous dispatch. Callers acquire the internal
    /// mutex in FIFO order, so request submission order is preserved (§5
    /// ordering guarantee) even though the lock is released before the
    /// network call itself runs.
    pub async fn acquire(&self) {
        let mut guard = self.last_dispatch.lock().await;
        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < self.min_gap {
                let wait = self.min_gap - elapsed;
                debug!(venue = self.venue, wait_ms = wait.as_millis() as u64, "throttling dispatch");
                tokio::time::sleep(wait).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enforces_minimum_gap_between_dispatches() {
        let throttle = VenueThrottle::new("test", 50);
        let start = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn fifo_order_preserved_across_concurrent_waiters() {
        use std::sync::{Arc, Mutex as StdMutex};

        let throttle = Arc::new(VenueThrottle::new("test", 10));
        let order = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let throttle = throttle.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                throttle.acquire().await;
                order.lock().unwrap().push(i);
            }));
            // Stagger spawns slightly so lock-acquisition order is
            // deterministic for the assertion below.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
