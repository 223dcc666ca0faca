// =============================================================================
// License Gate (C15)
// =============================================================================
//
// `enforce_bot_start_license` is the only license-gated transition in the
// system (`STOPPED -> RUNNING`, §4.13/§4.15). Entitlements are fetched once
// per `(userId)` and cached for `LICENSE_CACHE_TTL_SECONDS`; a stale/missing
// fetch degrades to `license_server_unreachable` rather than panicking.
// Structured the way the teacher's `risk.rs` keeps named-reason state behind
// an `RwLock<Inner>` with one evaluate-all entry point
// (`InsuranceGate::check_all` / circuit breaker snapshot), generalized here
// to "named decision reasons over one cached entitlement row".
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LicenseDecision;

/// Per-plan defaults applied when a workspace entitlement doesn't override
/// them explicitly (§4.15 "plan defaults").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    fn default_max_bots_total(self) -> u32 {
        match self {
            Plan::Free => 1,
            Plan::Pro => 10,
            Plan::Enterprise => 100,
        }
    }

    fn default_max_running_bots(self) -> u32 {
        match self {
            Plan::Free => 1,
            Plan::Pro => 5,
            Plan::Enterprise => 50,
        }
    }

    fn default_exchange_allowlist(self) -> Vec<String> {
        match self {
            Plan::Free => vec!["binance".to_string()],
            Plan::Pro | Plan::Enterprise => vec!["*".to_string()],
        }
    }
}

/// One workspace's resolved entitlement row, as returned by the license
/// server (or synthesized from plan defaults when fields are absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub plan: Plan,
    #[serde(default)]
    pub max_bots_total: Option<u32>,
    #[serde(default)]
    pub max_running_bots: Option<u32>,
    #[serde(default)]
    pub exchange_allowlist: Option<Vec<String>>,
    #[serde(default)]
    pub strategy_allowlist: Option<Vec<String>>,
    #[serde(default)]
    pub ai_model_allowlist: Option<Vec<String>>,
}

impl Entitlement {
    pub fn free_default() -> Self {
        Entitlement {
            plan: Plan::Free,
            max_bots_total: None,
            max_running_bots: None,
            exchange_allowlist: None,
            strategy_allowlist: None,
            ai_model_allowlist: None,
        }
    }

    fn max_bots_total(&self) -> u32 {
        self.max_bots_total.unwrap_or_else(|| self.plan.default_max_bots_total())
    }

    fn max_running_bots(&self) -> u32 {
        self.max_running_bots.unwrap_or_else(|| self.plan.default_max_running_bots())
    }

    fn exchange_allowlist(&self) -> Vec<String> {
        self.exchange_allowlist.clone().unwrap_or_else(|| self.plan.default_exchange_allowlist())
    }

    /// `*` in the allowlist matches every exchange (§4.15 wildcard rule).
    fn allows_exchange(&self, exchange: &str) -> bool {
        let list = self.exchange_allowlist();
        list.iter().any(|e| e == "*" || e.eq_ignore_ascii_case(exchange))
    }
}

/// Resolves entitlements; swappable for tests and for a real license-server
/// HTTP client in deployment.
#[async_trait::async_trait]
pub trait EntitlementSource: Send + Sync {
    async fn fetch(&self, user_id: &str) -> Option<Entitlement>;
}

/// Synthesizes a free-plan entitlement unconditionally; used when no
/// external license server is configured.
pub struct StaticFreeSource;

#[async_trait::async_trait]
impl EntitlementSource for StaticFreeSource {
    async fn fetch(&self, _user_id: &str) -> Option<Entitlement> {
        Some(Entitlement::free_default())
    }
}

struct CacheEntry {
    entitlement: Entitlement,
    cached_at: Instant,
}

/// Process-wide license gate. One instance is shared across every bot's
/// `start` call.
pub struct LicenseGate {
    source: Box<dyn EntitlementSource>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    enforcement: bool,
    cache_ttl: Duration,
}

impl LicenseGate {
    pub fn new(source: Box<dyn EntitlementSource>, enforcement: bool, cache_ttl_seconds: u64) -> Self {
        LicenseGate {
            source,
            cache: RwLock::new(HashMap::new()),
            enforcement,
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
        }
    }

    async fn entitlement_for(&self, user_id: &str) -> Option<Entitlement> {
        if let Some(entry) = self.cache.read().get(user_id) {
            if entry.cached_at.elapsed() < self.cache_ttl {
                return Some(entry.entitlement.clone());
            }
        }

        match self.source.fetch(user_id).await {
            Some(entitlement) => {
                self.cache.write().insert(
                    user_id.to_string(),
                    CacheEntry { entitlement: entitlement.clone(), cached_at: Instant::now() },
                );
                Some(entitlement)
            }
            None => {
                warn!(user_id, "license server unreachable, falling back to cached or denying start");
                None
            }
        }
    }

    /// §4.15 `enforceBotStartLicense`.
    pub async fn enforce_bot_start_license(
        &self,
        user_id: &str,
        exchange: &str,
        total_bots: u32,
        running_bots: u32,
        is_already_running: bool,
    ) -> LicenseDecision {
        if !self.enforcement {
            return LicenseDecision::EnforcementOff;
        }

        let entitlement = match self.entitlement_for(user_id).await {
            Some(e) => e,
            None => return LicenseDecision::LicenseServerUnreachable,
        };

        if total_bots > entitlement.max_bots_total() {
            return LicenseDecision::MaxBotsTotalExceeded;
        }

        if !is_already_running && running_bots >= entitlement.max_running_bots() {
            return LicenseDecision::MaxRunningBotsExceeded;
        }

        if !entitlement.allows_exchange(exchange) {
            return LicenseDecision::ExchangeNotAllowed;
        }

        LicenseDecision::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Entitlement);

    #[async_trait::async_trait]
    impl EntitlementSource for FixedSource {
        async fn fetch(&self, _user_id: &str) -> Option<Entitlement> {
            Some(self.0.clone())
        }
    }

    struct UnreachableSource;

    #[async_trait::async_trait]
    impl EntitlementSource for UnreachableSource {
        async fn fetch(&self, _user_id: &str) -> Option<Entitlement> {
            None
        }
    }

    #[tokio::test]
    async fn enforcement_off_short_circuits() {
        let gate = LicenseGate::new(Box::new(StaticFreeSource), false, 600);
        let decision = gate.enforce_bot_start_license("u1", "binance", 1, 0, false).await;
        assert_eq!(decision, LicenseDecision::EnforcementOff);
    }

    #[tokio::test]
    async fn free_plan_blocks_second_bot() {
        let gate = LicenseGate::new(Box::new(StaticFreeSource), true, 600);
        let decision = gate.enforce_bot_start_license("u1", "binance", 2, 0, false).await;
        assert_eq!(decision, LicenseDecision::MaxBotsTotalExceeded);
    }

    #[tokio::test]
    async fn free_plan_blocks_second_running_bot() {
        let gate = LicenseGate::new(Box::new(StaticFreeSource), true, 600);
        let decision = gate.enforce_bot_start_license("u1", "binance", 1, 1, false).await;
        assert_eq!(decision, LicenseDecision::MaxRunningBotsExceeded);
    }

    #[tokio::test]
    async fn already_running_bot_is_not_double_counted() {
        let gate = LicenseGate::new(Box::new(StaticFreeSource), true, 600);
        let decision = gate.enforce_bot_start_license("u1", "binance", 1, 1, true).await;
        assert_eq!(decision, LicenseDecision::Ok);
    }

    #[tokio::test]
    async fn free_plan_rejects_non_allowlisted_exchange() {
        let gate = LicenseGate::new(Box::new(StaticFreeSource), true, 600);
        let decision = gate.enforce_bot_start_license("u1", "bitget", 1, 0, false).await;
        assert_eq!(decision, LicenseDecision::ExchangeNotAllowed);
    }

    #[tokio::test]
    async fn wildcard_allowlist_allows_any_exchange() {
        let entitlement = Entitlement {
            exchange_allowlist: Some(vec!["*".to_string()]),
            ..Entitlement::free_default()
        };
        let gate = LicenseGate::new(Box::new(FixedSource(entitlement)), true, 600);
        let decision = gate.enforce_bot_start_license("u1", "bitget", 1, 0, false).await;
        assert_eq!(decision, LicenseDecision::Ok);
    }

    #[tokio::test]
    async fn unreachable_source_denies_on_first_fetch() {
        let gate = LicenseGate::new(Box::new(UnreachableSource), true, 600);
        let decision = gate.enforce_bot_start_license("u1", "binance", 1, 0, false).await;
        assert_eq!(decision, LicenseDecision::LicenseServerUnreachable);
    }
}
