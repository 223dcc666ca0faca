// =============================================================================
// AI-Guard Cache + Limiter (C6)
// =============================================================================
//
// `AiGuard::analyze_with_ai_guards` wraps a compute future with a per-key TTL
// cache and a sliding 60s rate-limit window: cache hit short-circuits,
// otherwise the window is pruned and checked before `compute` runs; on a
// rate-limit or a compute failure the caller's `fallback` is used and
// cached. Mirrors the `parking_lot::RwLock<HashMap<_,_>>` idiom the teacher
// uses for `AppState`'s shared collections. Single-flight-per-key is
// explicitly NOT provided here (§4.6) — callers that need it (only the
// composite DAG runner does, via its at-most-one-AI-call-per-run rule)
// layer it themselves.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};

const WINDOW: Duration = Duration::from_secs(60);

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiGuardOutcome {
    ComputeMiss,
    CacheHit,
    RateLimited,
    FallbackUsed,
}

pub struct AiGuardResult<T> {
    pub value: T,
    pub outcome: AiGuardOutcome,
}

impl<T> AiGuardResult<T> {
    pub fn cache_hit(&self) -> bool {
        self.outcome == AiGuardOutcome::CacheHit
    }
    pub fn rate_limited(&self) -> bool {
        self.outcome == AiGuardOutcome::RateLimited
    }
    pub fn fallback_used(&self) -> bool {
        matches!(self.outcome, AiGuardOutcome::RateLimited | AiGuardOutcome::FallbackUsed)
    }
}

/// Process-wide cache + sliding-window limiter. Constructed once at startup
/// and shared behind an `Arc` the way the teacher shares `AppState`.
#[derive(Default)]
pub struct AiGuard {
    cache: RwLock<HashMap<String, CacheEntry>>,
    windows: RwLock<HashMap<String, VecDeque<Instant>>>,
}

impl AiGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.6 steps 1-3. `ttl_sec`/`rate_limit_per_min` are per-call so callers
    /// can vary them by feature (e.g. explainer vs. composite-node AI call).
    pub async fn analyze_with_ai_guards<T, C, F, Fut>(
        &self,
        cache_key: &str,
        ttl_sec: u64,
        rate_limit_per_min: u32,
        compute: C,
        fallback: F,
    ) -> AiGuardResult<T>
    where
        T: Serialize + DeserializeOwned + Clone,
        C: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        F: FnOnce() -> T,
    {
        if let Some(cached) = self.read_cache::<T>(cache_key) {
            return AiGuardResult { value: cached, outcome: AiGuardOutcome::CacheHit };
        }

        if self.prune_and_check_rate_limited(cache_key, rate_limit_per_min) {
            let value = fallback();
            self.write_cache(cache_key, &value, ttl_sec);
            return AiGuardResult { value, outcome: AiGuardOutcome::RateLimited };
        }

        self.record_call(cache_key);
        match compute().await {
            Ok(value) => {
                self.write_cache(cache_key, &value, ttl_sec);
                AiGuardResult { value, outcome: AiGuardOutcome::ComputeMiss }
            }
            Err(_) => {
                let value = fallback();
                self.write_cache(cache_key, &value, ttl_sec);
                AiGuardResult { value, outcome: AiGuardOutcome::FallbackUsed }
            }
        }
    }

    fn read_cache<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.cache.read();
        let entry = cache.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    fn write_cache<T: Serialize>(&self, key: &str, value: &T, ttl_sec: u64) {
        let Ok(json) = serde_json::to_value(value) else { return };
        let mut cache = self.cache.write();
        cache.insert(
            key.to_string(),
            CacheEntry { value: json, expires_at: Instant::now() + Duration::from_secs(ttl_sec) },
        );
    }

    /// Prunes entries older than 60s, then reports whether the window is
    /// already at (or above) `rate_limit_per_min` — in which case the caller
    /// must NOT record this attempt (§4.6 step 2 runs before step 3's append).
    fn prune_and_check_rate_limited(&self, key: &str, rate_limit_per_min: u32) -> bool {
        let mut windows = self.windows.write();
        let entry = windows.entry(key.to_string()).or_default();
        let cutoff = Instant::now() - WINDOW;
        while matches!(entry.front(), Some(t) if *t < cutoff) {
            entry.pop_front();
        }
        entry.len() as u32 >= rate_limit_per_min
    }

    fn record_call(&self, key: &str) {
        let mut windows = self.windows.write();
        windows.entry(key.to_string()).or_default().push_back(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn cache_hit_short_circuits_compute() {
        let guard = AiGuard::new();
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let result = guard
                .analyze_with_ai_guards(
                    "stable-key",
                    300,
                    60,
                    || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async move { Ok::<i32, anyhow::Error>(7) }
                    },
                    || -1,
                )
                .await;
            assert_eq!(result.value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shared_key_hits_rate_limit_on_third_call() {
        let guard = AiGuard::new();
        let mut outcomes = Vec::new();
        for _ in 0..3 {
            // ttl=0 forces a fresh compute/rate-limit check each call while
            // still sharing the rate-limit window under "shared".
            let r = guard
                .analyze_with_ai_guards("shared", 0, 2, || async { Ok::<i32, anyhow::Error>(9) }, || -1)
                .await;
            outcomes.push(r.outcome);
        }
        assert_eq!(outcomes[0], AiGuardOutcome::ComputeMiss);
        assert_eq!(outcomes[1], AiGuardOutcome::ComputeMiss);
        assert_eq!(outcomes[2], AiGuardOutcome::RateLimited);
    }
}
