// =============================================================================
// Local Strategy Registry (C12)
// =============================================================================
//
// Built-in, in-process strategy handlers: `regime_gate` and `signal_filter`.
// Each takes a `StrategyContext` (current signal/confidence/feature
// snapshot) and returns a `StrategyOutcome` the composite DAG runner (C11)
// folds into the node's output signal/confidence. Grounded on the teacher's
// `trade_insurance::InsuranceGate`/`smart_filters` gate style: a
// struct-of-config plus a `fn evaluate(...) -> GateResult` returning a coded
// blocking reason instead of panicking or silently passing.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::signal::types::{FeatureSnapshot, Signal};

#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub signal: Signal,
    pub confidence: f64,
    pub feature_snapshot: FeatureSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub allow: bool,
    pub score: f64,
    pub reason_codes: Vec<String>,
    pub tags: Vec<String>,
    pub explanation: String,
    pub meta: serde_json::Value,
}

impl StrategyOutcome {
    fn blocked(reason: &str) -> Self {
        StrategyOutcome {
            allow: false,
            score: 0.0,
            reason_codes: vec![reason.to_string()],
            tags: vec![],
            explanation: String::new(),
            meta: serde_json::Value::Null,
        }
    }
}

/// A local (in-process) strategy handler.
pub trait LocalStrategy: Send + Sync {
    fn evaluate(&self, ctx: &StrategyContext, config: &serde_json::Value) -> StrategyOutcome;
}

/// §4.12 `regime_gate`: requires `historyContext.reg.state` in an allowlist,
/// minimum confidence, and EMA-stack / signal-stack alignment with the
/// detected regime.
pub struct RegimeGate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegimeGateConfig {
    #[serde(default = "default_allow_states")]
    allow_states: Vec<String>,
    #[serde(default)]
    min_confidence: f64,
}

fn default_allow_states() -> Vec<String> {
    vec!["trending".to_string(), "breakout".to_string()]
}

impl LocalStrategy for RegimeGate {
    fn evaluate(&self, ctx: &StrategyContext, config: &serde_json::Value) -> StrategyOutcome {
        let cfg: RegimeGateConfig = serde_json::from_value(config.clone()).unwrap_or(RegimeGateConfig {
            allow_states: default_allow_states(),
            min_confidence: 0.0,
        });

        let Some(state) = ctx.feature_snapshot.get("historyContext.reg.state").and_then(|v| v.as_str())
        else {
            return StrategyOutcome::blocked("regime_unknown");
        };

        if !cfg.allow_states.iter().any(|s| s == state) {
            return StrategyOutcome::blocked("regime_state_not_allowed");
        }

        if ctx.confidence < cfg.min_confidence {
            return StrategyOutcome::blocked("regime_confidence_low");
        }

        let ema_bias_up = ctx.feature_snapshot.get_f64("historyContext.ema.spread").map(|v| v > 0.0);
        if let Some(ema_up) = ema_bias_up {
            let signal_up = matches!(ctx.signal, Signal::Up);
            let signal_down = matches!(ctx.signal, Signal::Down);
            if (ema_up && signal_down) || (!ema_up && signal_up) {
                return StrategyOutcome::blocked("ema_stack_conflict");
            }
        }

        let regime_bias_up = state == "trending_up" || state == "breakout_up";
        let regime_bias_down = state == "trending_down" || state == "breakout_down";
        if (regime_bias_up && matches!(ctx.signal, Signal::Down))
            || (regime_bias_down && matches!(ctx.signal, Signal::Up))
        {
            return StrategyOutcome::blocked("signal_stack_conflict");
        }

        StrategyOutcome {
            allow: true,
            score: ctx.confidence,
            reason_codes: vec!["regime_allowed".to_string()],
            tags: vec![],
            explanation: format!("regime '{state}' allows current signal"),
            meta: serde_json::Value::Null,
        }
    }
}

/// §4.12 `signal_filter`: tag allow/blocklist, `|volZ| <= maxVolZ`, and
/// range-state handling via `allowRangeWhenTrendTag`.
pub struct SignalFilter;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignalFilterConfig {
    #[serde(default)]
    tag_allowlist: Vec<String>,
    #[serde(default)]
    tag_blocklist: Vec<String>,
    #[serde(default = "default_max_vol_z")]
    max_vol_z: f64,
    #[serde(default)]
    allow_range_when_trend_tag: Option<String>,
}

fn default_max_vol_z() -> f64 {
    2.5
}

impl LocalStrategy for SignalFilter {
    fn evaluate(&self, ctx: &StrategyContext, config: &serde_json::Value) -> StrategyOutcome {
        let cfg: SignalFilterConfig = serde_json::from_value(config.clone()).unwrap_or(SignalFilterConfig {
            tag_allowlist: vec![],
            tag_blocklist: vec![],
            max_vol_z: default_max_vol_z(),
            allow_range_when_trend_tag: None,
        });

        let tags = ctx.feature_snapshot.tags();

        if !cfg.tag_blocklist.is_empty() && tags.iter().any(|t| cfg.tag_blocklist.contains(t)) {
            return StrategyOutcome::blocked("tag_blocklisted");
        }

        if !cfg.tag_allowlist.is_empty() && !tags.iter().any(|t| cfg.tag_allowlist.contains(t)) {
            return StrategyOutcome::blocked("tag_not_allowlisted");
        }

        let vol_z = ctx.feature_snapshot.get_f64("historyContext.vol.z").unwrap_or(0.0);
        if vol_z.abs() > cfg.max_vol_z {
            let score = (70.0 - 10.0 * (vol_z.abs() - 1.0).max(0.0)).clamp(0.0, 30.0);
            return StrategyOutcome {
                allow: false,
                score,
                reason_codes: vec!["vol_z_out_of_range".to_string()],
                tags: vec![],
                explanation: format!("|volZ|={:.2} exceeds max {:.2}", vol_z, cfg.max_vol_z),
                meta: serde_json::Value::Null,
            };
        }

        let range_state = ctx
            .feature_snapshot
            .get("historyContext.reg.state")
            .and_then(|v| v.as_str())
            == Some("ranging");
        if range_state {
            let allowed = cfg
                .allow_range_when_trend_tag
                .as_ref()
                .map(|t| tags.contains(t))
                .unwrap_or(false);
            if !allowed {
                return StrategyOutcome::blocked("range_state_not_allowed");
            }
        }

        let score = (70.0 - 10.0 * (vol_z.abs() - 1.0).max(0.0)).clamp(0.0, 100.0);
        StrategyOutcome {
            allow: true,
            score,
            reason_codes: vec!["signal_allowed".to_string()],
            tags: vec![],
            explanation: "tag/volatility filters satisfied".to_string(),
            meta: serde_json::Value::Null,
        }
    }
}

/// Registry of built-in local strategies plus any fallback-resolution
/// targets registered for C12's python-sidecar fallback.
pub struct LocalStrategyRegistry {
    handlers: HashMap<String, Box<dyn LocalStrategy>>,
}

impl LocalStrategyRegistry {
    pub fn with_builtins() -> Self {
        let mut handlers: HashMap<String, Box<dyn LocalStrategy>> = HashMap::new();
        handlers.insert("regime_gate".to_string(), Box::new(RegimeGate));
        handlers.insert("signal_filter".to_string(), Box::new(SignalFilter));
        LocalStrategyRegistry { handlers }
    }

    pub fn get(&self, strategy_type: &str) -> Option<&dyn LocalStrategy> {
        self.handlers.get(strategy_type).map(|b| b.as_ref())
    }

    pub fn contains(&self, strategy_type: &str) -> bool {
        self.handlers.contains_key(strategy_type)
    }
}

impl Default for LocalStrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(signal: Signal, confidence: f64) -> StrategyContext {
        StrategyContext { signal, confidence, feature_snapshot: FeatureSnapshot::new() }
    }

    #[test]
    fn regime_gate_blocks_unknown_regime() {
        let outcome = RegimeGate.evaluate(&ctx(Signal::Up, 80.0), &serde_json::json!({}));
        assert!(!outcome.allow);
        assert_eq!(outcome.reason_codes, vec!["regime_unknown".to_string()]);
    }

    #[test]
    fn regime_gate_allows_matching_trend_state() {
        let mut context = ctx(Signal::Up, 80.0);
        context.feature_snapshot.set("historyContext.reg.state", "trending_up");
        let outcome = RegimeGate.evaluate(&context, &serde_json::json!({"allowStates": ["trending_up"]}));
        assert!(outcome.allow);
    }

    #[test]
    fn regime_gate_blocks_signal_stack_conflict() {
        let mut context = ctx(Signal::Down, 80.0);
        context.feature_snapshot.set("historyContext.reg.state", "trending_up");
        let outcome = RegimeGate.evaluate(&context, &serde_json::json!({"allowStates": ["trending_up"]}));
        assert!(!outcome.allow);
        assert_eq!(outcome.reason_codes, vec!["signal_stack_conflict".to_string()]);
    }

    #[test]
    fn signal_filter_blocks_high_vol_z_with_partial_score() {
        let mut context = ctx(Signal::Up, 80.0);
        context.feature_snapshot.set("historyContext.vol.z", 3.0);
        let outcome = SignalFilter.evaluate(&context, &serde_json::json!({"maxVolZ": 2.5}));
        assert!(!outcome.allow);
        assert!(outcome.score > 0.0 && outcome.score <= 30.0);
    }

    #[test]
    fn signal_filter_blocks_blocklisted_tag() {
        let mut context = ctx(Signal::Up, 80.0);
        context.feature_snapshot.set_tags(vec!["news_risk".to_string()]);
        let outcome = SignalFilter.evaluate(&context, &serde_json::json!({"tagBlocklist": ["news_risk"]}));
        assert!(!outcome.allow);
    }

    #[test]
    fn registry_resolves_builtins() {
        let registry = LocalStrategyRegistry::with_builtins();
        assert!(registry.contains("regime_gate"));
        assert!(registry.contains("signal_filter"));
        assert!(registry.get("unknown_strategy").is_none());
    }
}
