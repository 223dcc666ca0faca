// =============================================================================
// Python Strategy Sidecar Client (C12)
// =============================================================================
//
// Bounded HTTP dispatch to `POST /v1/strategies/run` (wire contract only;
// transport is swappable per §9). Wraps calls with a consecutive-failure
// circuit breaker (same atomic-counter idiom as the teacher's rate-limit
// trackers), shadow mode (record python's decision but enforce the
// configured fallback), and fallback-strategy resolution. `config_hash`/
// `snapshot_hash` are computed over stable-canonicalized inputs via C5 so
// identical inputs are provably identical outputs (§4.12 determinism test
// invariant).
// =============================================================================

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PyStrategyConfig;
use crate::hashing::hash_stable_object;
use crate::strategy::local::{LocalStrategyRegistry, StrategyContext, StrategyOutcome};

#[derive(Debug, Serialize)]
struct SidecarRunRequest {
    strategy_type: String,
    config_hash: String,
    snapshot_hash: String,
    signal: String,
    confidence: f64,
    feature_snapshot: serde_json::Value,
    config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SidecarRunResponse {
    allow: bool,
    score: f64,
    #[serde(default)]
    reason_codes: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    meta: serde_json::Value,
}

/// Per-strategy-type circuit breaker: opens after `K` consecutive failures,
/// stays open for `cb_cooldown_ms`.
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    opened_at_ms: AtomicU64,
    failure_threshold: u32,
    cooldown_ms: u64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown_ms: u64) -> Self {
        CircuitBreaker {
            consecutive_failures: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            failure_threshold,
            cooldown_ms,
        }
    }

    pub fn is_open(&self, now_ms: u64) -> bool {
        let opened_at = self.opened_at_ms.load(Ordering::SeqCst);
        if opened_at == 0 {
            return false;
        }
        now_ms.saturating_sub(opened_at) < self.cooldown_ms
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.opened_at_ms.store(0, Ordering::SeqCst);
    }

    pub fn record_failure(&self, now_ms: u64) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.failure_threshold {
            self.opened_at_ms.store(now_ms, Ordering::SeqCst);
        }
    }
}

pub struct SidecarClient {
    http: Client,
    cfg: PyStrategyConfig,
    breaker: CircuitBreaker,
}

impl SidecarClient {
    pub fn new(cfg: PyStrategyConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms.clamp(200, 10_000)))
            .build()
            .expect("sidecar http client");
        SidecarClient { http, cfg, breaker: CircuitBreaker::new(3, 30_000) }
    }

    /// Dispatches a `python`-engine strategy, honoring shadow mode and the
    /// configured fallback. `now_ms` drives the circuit-breaker cooldown.
    pub async fn run(
        &self,
        strategy_type: &str,
        ctx: &StrategyContext,
        config: &serde_json::Value,
        shadow_mode: bool,
        fallback_strategy_type: Option<&str>,
        registry: &LocalStrategyRegistry,
        now_ms: u64,
    ) -> StrategyOutcome {
        let config_hash = hash_stable_object(config);
        let snapshot_value = serde_json::to_value(&ctx.feature_snapshot).unwrap_or(serde_json::Value::Null);
        let snapshot_hash = hash_stable_object(&snapshot_value);

        let resolve_fallback = |reason: &str| -> StrategyOutcome {
            let fallback_type = fallback_strategy_type.unwrap_or(strategy_type);
            if let Some(handler) = registry.get(fallback_type) {
                let mut outcome = handler.evaluate(ctx, config);
                outcome.reason_codes.push(reason.to_string());
                outcome
            } else {
                StrategyOutcome {
                    allow: false,
                    score: 0.0,
                    reason_codes: vec!["python_unavailable_no_fallback".to_string()],
                    tags: vec![],
                    explanation: String::new(),
                    meta: serde_json::Value::Null,
                }
            }
        };

        if !self.cfg.enabled {
            return resolve_fallback("python_disabled");
        }

        if self.breaker.is_open(now_ms) {
            return resolve_fallback("circuit_breaker_open");
        }

        let request = SidecarRunRequest {
            strategy_type: strategy_type.to_string(),
            config_hash,
            snapshot_hash,
            signal: ctx.signal.to_string(),
            confidence: ctx.confidence,
            feature_snapshot: snapshot_value,
            config: config.clone(),
        };

        let url = format!("{}/v1/strategies/run", self.cfg.url.trim_end_matches('/'));
        let response = self.http.post(&url).json(&request).send().await;

        let python_outcome = match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<SidecarRunResponse>().await {
                Ok(body) => {
                    self.breaker.record_success();
                    Some(StrategyOutcome {
                        allow: body.allow,
                        score: body.score,
                        reason_codes: body.reason_codes,
                        tags: body.tags,
                        explanation: body.explanation,
                        meta: body.meta,
                    })
                }
                Err(e) => {
                    warn!(error = %e, strategy_type, "sidecar response parse failure");
                    self.breaker.record_failure(now_ms);
                    None
                }
            },
            Ok(resp) => {
                warn!(status = %resp.status(), strategy_type, "sidecar non-success response");
                self.breaker.record_failure(now_ms);
                None
            }
            Err(e) => {
                warn!(error = %e, strategy_type, "sidecar request failed");
                self.breaker.record_failure(now_ms);
                None
            }
        };

        match python_outcome {
            None => resolve_fallback("python_call_failed"),
            Some(outcome) if shadow_mode => {
                let mut fallback = resolve_fallback("shadow_mode_not_enforced");
                fallback.meta = serde_json::json!({ "pythonDecision": outcome });
                fallback
            }
            Some(outcome) => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_breaker_opens_after_threshold_and_expires_after_cooldown() {
        let breaker = CircuitBreaker::new(2, 1_000);
        assert!(!breaker.is_open(0));
        breaker.record_failure(0);
        assert!(!breaker.is_open(0));
        breaker.record_failure(0);
        assert!(breaker.is_open(500));
        assert!(!breaker.is_open(2_000));
    }

    #[test]
    fn circuit_breaker_resets_on_success() {
        let breaker = CircuitBreaker::new(2, 1_000);
        breaker.record_failure(0);
        breaker.record_success();
        breaker.record_failure(0);
        assert!(!breaker.is_open(0));
    }
}
