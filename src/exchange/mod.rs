// =============================================================================
// Exchange Gateway (C1-C4)
// =============================================================================
//
// Symbol normalization (C1), precision/lot-size math (C2), signed HTTP
// plumbing — signer, throttle, retry, catalog cache (C3) — and the nine
// venue adapters behind the common `ExchangeAdapter` contract (C4).
// =============================================================================

pub mod adapter;
pub mod catalog;
pub mod client;
pub mod http;
pub mod precision;
pub mod queue;
pub mod signing;
pub mod symbol;
pub mod venues;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::VenueThrottleConfig;

pub use adapter::ExchangeAdapter;
pub use symbol::CanonicalSymbol;

/// Registry of live adapters keyed by venue name, built once at startup from
/// env-sourced credentials (§6) and handed to the orchestrator (C13) and
/// signal pipeline (C7-C9) as a shared `Arc` map.
pub type AdapterRegistry = HashMap<&'static str, Arc<dyn ExchangeAdapter>>;

/// Builds every configured venue adapter from environment-sourced
/// credentials. A venue whose API key/secret env vars are unset is skipped
/// silently — bots referencing it simply have no adapter to route through,
/// which the orchestrator (C13) surfaces as a startup validation error.
pub fn build_registry(throttle_cfg: &VenueThrottleConfig) -> AdapterRegistry {
    let mut registry: AdapterRegistry = HashMap::new();

    macro_rules! creds {
        ($venue:literal) => {{
            let key = std::env::var(concat!(
                "HELIOS_",
                $venue,
                "_API_KEY"
            ))
            .ok();
            let secret = std::env::var(concat!(
                "HELIOS_",
                $venue,
                "_API_SECRET"
            ))
            .ok();
            key.zip(secret)
        }};
    }

    if let Some((key, secret)) = creds!("BINANCE") {
        let gap = throttle_cfg.min_gap_ms("binance");
        registry.insert(
            "binance",
            Arc::new(venues::binance::BinanceAdapter::new(key, secret, gap)),
        );
    }
    if let Some((key, secret)) = creds!("BINGX") {
        let gap = throttle_cfg.min_gap_ms("bingx");
        registry.insert("bingx", Arc::new(venues::bingx::BingxAdapter::new(key, secret, gap)));
    }
    if let Some((key, secret)) = creds!("MEXC") {
        let gap = throttle_cfg.min_gap_ms("mexc");
        registry.insert("mexc", Arc::new(venues::mexc::MexcAdapter::new(key, secret, gap)));
    }
    if let Some((key, secret)) = creds!("BITMART") {
        let gap = throttle_cfg.min_gap_ms("bitmart");
        let memo = Box::leak(
            std::env::var("HELIOS_BITMART_MEMO")
                .unwrap_or_default()
                .into_boxed_str(),
        );
        registry.insert(
            "bitmart",
            Arc::new(venues::bitmart::BitmartAdapter::new(key, secret, memo, gap)),
        );
    }
    if let Some((key, secret)) = creds!("BITGET") {
        let gap = throttle_cfg.min_gap_ms("bitget");
        let passphrase = Box::leak(
            std::env::var("HELIOS_BITGET_PASSPHRASE")
                .unwrap_or_default()
                .into_boxed_str(),
        );
        registry.insert(
            "bitget",
            Arc::new(venues::bitget::BitgetAdapter::new(key, secret, passphrase, gap)),
        );
    }
    if let Some((key, secret)) = creds!("KUCOIN") {
        let gap = throttle_cfg.min_gap_ms("kucoin");
        let passphrase = std::env::var("HELIOS_KUCOIN_PASSPHRASE").unwrap_or_default();
        registry.insert(
            "kucoin",
            Arc::new(venues::kucoin::KucoinAdapter::new(key, secret, &passphrase, gap)),
        );
    }
    if let Some((key, secret)) = creds!("COINSTORE") {
        let gap = throttle_cfg.min_gap_ms("coinstore");
        registry.insert(
            "coinstore",
            Arc::new(venues::coinstore::CoinstoreAdapter::new(key, secret, gap)),
        );
    }
    if let Some((key, secret)) = creds!("P2B") {
        let gap = throttle_cfg.min_gap_ms("p2b");
        registry.insert("p2b", Arc::new(venues::p2b::P2bAdapter::new(key, secret, gap)));
    }
    if let Some((key, secret)) = creds!("PIONEX") {
        let gap = throttle_cfg.min_gap_ms("pionex");
        registry.insert(
            "pionex",
            Arc::new(venues::pionex::PionexAdapter::new(key, secret, gap)),
        );
    }

    registry
}
