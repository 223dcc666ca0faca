// =============================================================================
// Catalog Cache — Symbol Listings + Meta (C3)
// =============================================================================
//
// Symbol listings cached 15 minutes, per-symbol meta cached 10 minutes; a
// stale entry still satisfies a request on 429 if present (§4.3). Grounded
// on the teacher's `AppState` idiom: `parking_lot::RwLock<HashMap<_,_>>`
// with copy-on-read semantics (§5 shared-state design).
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::exchange::precision::SymbolMeta;

struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

/// Per-venue cache of the symbol listing and per-symbol precision metadata.
pub struct CatalogCache {
    listing_ttl: Duration,
    meta_ttl: Duration,
    listing: RwLock<Option<Cached<Vec<String>>>>,
    meta: RwLock<HashMap<String, Cached<SymbolMeta>>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self {
            listing_ttl: Duration::from_secs(15 * 60),
            meta_ttl: Duration::from_secs(10 * 60),
            listing: RwLock::new(None),
            meta: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_listing(&self) -> Option<Vec<String>> {
        let guard = self.listing.read();
        guard.as_ref().and_then(|c| {
            if c.fetched_at.elapsed() < self.listing_ttl {
                Some(c.value.clone())
            } else {
                None
            }
        })
    }

    /// Returns the listing even if stale, for the on-429 fallback path.
    pub fn get_listing_stale(&self) -> Option<Vec<String>> {
        self.listing.read().as_ref().map(|c| c.value.clone())
    }

    pub fn put_listing(&self, symbols: Vec<String>) {
        *self.listing.write() = Some(Cached {
            value: symbols,
            fetched_at: Instant::now(),
        });
    }

    pub fn get_meta(&self, symbol: &str) -> Option<SymbolMeta> {
        let guard = self.meta.read();
        guard.get(symbol).and_then(|c| {
            if c.fetched_at.elapsed() < self.meta_ttl {
                Some(c.value.clone())
            } else {
                None
            }
        })
    }

    pub fn get_meta_stale(&self, symbol: &str) -> Option<SymbolMeta> {
        self.meta.read().get(symbol).map(|c| c.value.clone())
    }

    pub fn put_meta(&self, symbol: impl Into<String>, meta: SymbolMeta) {
        self.meta.write().insert(
            symbol.into(),
            Cached {
                value: meta,
                fetched_at: Instant::now(),
            },
        );
    }
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_listing_is_returned() {
        let cache = CatalogCache::new();
        cache.put_listing(vec!["BTCUSDT".into()]);
        assert_eq!(cache.get_listing(), Some(vec!["BTCUSDT".into()]));
    }

    #[test]
    fn stale_fallback_still_available_when_fresh_lookup_misses() {
        let mut cache = CatalogCache::new();
        cache.listing_ttl = Duration::from_millis(1);
        cache.put_listing(vec!["ETHUSDT".into()]);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get_listing(), None);
        assert_eq!(cache.get_listing_stale(), Some(vec!["ETHUSDT".into()]));
    }

    #[test]
    fn meta_cache_round_trips() {
        let cache = CatalogCache::new();
        let meta = SymbolMeta {
            price_step: Some(0.01),
            ..Default::default()
        };
        cache.put_meta("BTCUSDT", meta.clone());
        assert_eq!(cache.get_meta("BTCUSDT").unwrap().price_step, meta.price_step);
    }
}
