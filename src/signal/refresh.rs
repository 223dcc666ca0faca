// =============================================================================
// Prediction Refresh Service (C9)
// =============================================================================
//
// Composes the trigger engine (C8) over a freshly computed feature snapshot,
// decides whether the change is significant enough to persist, gates any AI
// explainer call behind cooldown + significance, and emits throttled events.
// Grounded on the teacher's `strategy.rs` `evaluate_symbol` pipeline shape
// (gather -> indicators -> regime -> score -> gate -> decide), generalized
// from "trade proposal" output to "prediction state" output.
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::config::PredictionConfig;
use crate::signal::trigger::{should_refresh_tf, RefreshDecision, TriggerBucketState, TriggerInput};
use crate::signal::types::{FeatureSnapshot, PredictionState, Signal, TriggerDebounceState};

/// Explains a candidate prediction, either locally (rule-based, always
/// available) or via an AI backend (subject to C10's quality gate, called by
/// the orchestrator before this trait is invoked).
#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(
        &self,
        prev: Option<&PredictionState>,
        candidate: &PredictionState,
    ) -> anyhow::Result<(String, Vec<String>)>;

    /// Model version tag suffix, e.g. `local-explain-v1` / `openai-explain-v1`.
    fn model_tag(&self) -> &'static str;
}

/// Trivial rule-based explainer: always succeeds, never calls out.
pub struct LocalExplainer;

#[async_trait]
impl Explainer for LocalExplainer {
    async fn explain(
        &self,
        _prev: Option<&PredictionState>,
        candidate: &PredictionState,
    ) -> anyhow::Result<(String, Vec<String>)> {
        let explanation = format!(
            "{} signal at {:.0}% confidence, expected move {:.1}%",
            candidate.signal, candidate.confidence, candidate.expected_move_pct
        );
        Ok((explanation, candidate.key_drivers.clone()))
    }

    fn model_tag(&self) -> &'static str {
        "local-explain-v1"
    }
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub persisted: bool,
    pub prediction: PredictionState,
    pub signal_source: SignalSource,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    Local,
    Ai,
}

/// §4.9.1: any of signal change, |delta confidence| >= 10, tag-set change,
/// ATR/trend-rank bucket change, or breakout crossing 0.8 upward.
pub fn is_significant(
    prev: Option<&PredictionState>,
    candidate: &PredictionState,
    bucket_changed: bool,
    breakout_crossed_up: bool,
) -> bool {
    let Some(prev) = prev else { return true };
    if prev.signal != candidate.signal {
        return true;
    }
    if (candidate.confidence - prev.confidence).abs() >= 10.0 {
        return true;
    }
    if prev.tags != candidate.tags {
        return true;
    }
    bucket_changed || breakout_crossed_up
}

/// §4.9.2: AI eligibility requires significance plus one of signal flip /
/// confidence jump >= 10 / tag-set change, and respects the cooldown.
pub fn ai_call_eligible(
    prev: Option<&PredictionState>,
    candidate: &PredictionState,
    now_ms: i64,
    cfg: &PredictionConfig,
) -> bool {
    let Some(prev) = prev else { return true };

    let flipped = prev.signal.flipped(candidate.signal);
    let conf_jump = (candidate.confidence - prev.confidence).abs() >= 10.0;
    let tags_changed = prev.tags != candidate.tags;
    if !(flipped || conf_jump || tags_changed) {
        return false;
    }

    if let Some(last) = candidate.last_ai_explained_at {
        if now_ms - last < (cfg.ai_cooldown_sec as i64) * 1000 {
            return false;
        }
    }
    true
}

/// Per-`(bot, timeframe, reasonCode)` event throttle and unstable-prediction
/// bookkeeping (§4.9 step 5; the `(bot,timeframe,reasonCode)` keying follows
/// the Open Question resolution in spec.md §9).
pub struct EventThrottle {
    last_emitted_ms: RwLock<HashMap<String, i64>>,
    recent_flips: RwLock<HashMap<String, Vec<i64>>>,
}

impl EventThrottle {
    pub fn new() -> Self {
        EventThrottle {
            last_emitted_ms: RwLock::new(HashMap::new()),
            recent_flips: RwLock::new(HashMap::new()),
        }
    }

    fn key(bot_id: &str, timeframe: &str, reason: &str) -> String {
        format!("{bot_id}:{timeframe}:{reason}")
    }

    /// Returns `true` when the event should actually be emitted this tick.
    pub fn should_emit(&self, bot_id: &str, timeframe: &str, reason: &str, now_ms: i64, cfg: &PredictionConfig) -> bool {
        let key = Self::key(bot_id, timeframe, reason);
        let mut map = self.last_emitted_ms.write();
        let throttle_ms = (cfg.event_throttle_sec as i64) * 1000;
        match map.get(&key) {
            Some(last) if now_ms - last < throttle_ms => false,
            _ => {
                map.insert(key, now_ms);
                true
            }
        }
    }

    /// Records a signal flip for `(bot,timeframe)` and returns whether the
    /// prediction should now be marked unstable (>=4 flips in 30min).
    pub fn record_flip_and_check_unstable(&self, bot_id: &str, timeframe: &str, now_ms: i64) -> bool {
        let key = format!("{bot_id}:{timeframe}");
        let mut map = self.recent_flips.write();
        let entry = map.entry(key).or_default();
        entry.push(now_ms);
        let window_start = now_ms - 30 * 60 * 1000;
        entry.retain(|t| *t >= window_start);
        entry.len() >= 4
    }
}

impl Default for EventThrottle {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates one `(bot, timeframe)` refresh tick: trigger decision ->
/// significance -> AI eligibility -> explain -> event emission. Does not
/// itself call out to C10/C6; the caller (orchestrator) supplies an
/// `Explainer` already wrapped by the quality gate + AI guard when AI use is
/// desired, so this service stays agnostic of which explainer backs it.
pub struct PredictionRefreshService {
    pub throttle: EventThrottle,
}

impl PredictionRefreshService {
    pub fn new() -> Self {
        PredictionRefreshService { throttle: EventThrottle::new() }
    }

    /// Runs the full refresh decision for one tick. `candidate` is the
    /// freshly computed next-state prediction (before explanation is
    /// attached); `trigger_input`/`bucket_state`/`debounce_state` feed C8.
    #[allow(clippy::too_many_arguments)]
    pub async fn refresh(
        &self,
        bot_id: &str,
        timeframe: &str,
        prev: Option<PredictionState>,
        mut candidate: PredictionState,
        trigger_input: TriggerInput,
        bucket_state: TriggerBucketState,
        debounce_state: TriggerDebounceState,
        ai_explainer: Option<&dyn Explainer>,
        local_explainer: &dyn Explainer,
        cfg: &PredictionConfig,
    ) -> (RefreshOutcome, RefreshDecision) {
        let decision = should_refresh_tf(&trigger_input, &bucket_state, &debounce_state, cfg);
        if !decision.refresh {
            candidate.ts_updated = prev.as_ref().map(|p| p.ts_updated).unwrap_or(candidate.ts_updated);
            return (
                RefreshOutcome {
                    persisted: false,
                    prediction: prev.unwrap_or(candidate),
                    signal_source: SignalSource::Local,
                    events: vec![],
                },
                decision,
            );
        }

        let bucket_changed = bucket_state.trend_entered != TriggerBucketState::default().trend_entered;
        let breakout_crossed_up = bucket_state.breakout_above;
        let significant = is_significant(prev.as_ref(), &candidate, bucket_changed, breakout_crossed_up);

        if !significant {
            candidate.ts_updated = trigger_input.now_ms;
            return (
                RefreshOutcome {
                    persisted: true,
                    prediction: candidate,
                    signal_source: SignalSource::Local,
                    events: vec![],
                },
                decision,
            );
        }

        let use_ai = ai_explainer.is_some()
            && ai_call_eligible(prev.as_ref(), &candidate, trigger_input.now_ms, cfg);

        let (explanation, drivers, source, model_tag) = if use_ai {
            let explainer = ai_explainer.unwrap();
            match explainer.explain(prev.as_ref(), &candidate).await {
                Ok((exp, drivers)) => {
                    candidate.last_ai_explained_at = Some(trigger_input.now_ms);
                    (exp, drivers, SignalSource::Ai, explainer.model_tag())
                }
                Err(e) => {
                    info!(error = %e, "ai explainer failed, falling back to local explanation");
                    let (exp, drivers) = local_explainer
                        .explain(prev.as_ref(), &candidate)
                        .await
                        .unwrap_or_default();
                    (exp, drivers, SignalSource::Local, local_explainer.model_tag())
                }
            }
        } else {
            let (exp, drivers) = local_explainer
                .explain(prev.as_ref(), &candidate)
                .await
                .unwrap_or_default();
            (exp, drivers, SignalSource::Local, local_explainer.model_tag())
        };

        candidate.explanation = explanation;
        candidate.key_drivers = drivers;
        candidate.key_drivers.truncate(5);
        candidate.ts_updated = trigger_input.now_ms;
        candidate.model_version = format!("helios-prediction-v1 + {model_tag}");
        candidate.clamp_fields();

        let mut events = Vec::new();
        let mut push_event = |throttle: &EventThrottle, reason: &str| {
            if throttle.should_emit(bot_id, timeframe, reason, trigger_input.now_ms, cfg) {
                events.push(reason.to_string());
            }
        };

        if let Some(prev) = &prev {
            if prev.signal.flipped(candidate.signal) {
                push_event(&self.throttle, "signal_flip");
                if self.throttle.record_flip_and_check_unstable(bot_id, timeframe, trigger_input.now_ms) {
                    candidate.unstable = true;
                }
            }
            if (candidate.confidence - prev.confidence).abs() >= 10.0 {
                push_event(&self.throttle, "confidence_jump");
            }
            if prev.tags != candidate.tags {
                push_event(&self.throttle, "tags_changed");
            }
        }
        if bucket_changed {
            push_event(&self.throttle, "regime_change");
        }

        (
            RefreshOutcome {
                persisted: true,
                prediction: candidate,
                signal_source: source,
                events,
            },
            decision,
        )
    }
}

impl Default for PredictionRefreshService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::types::prediction_unique_key;

    fn base_prediction(signal: Signal, confidence: f64) -> PredictionState {
        PredictionState {
            unique_key: prediction_unique_key("binance", "acct", "BTC/USDT", "spot", "1h"),
            signal,
            confidence,
            expected_move_pct: 1.0,
            tags: vec![],
            key_drivers: vec![],
            explanation: String::new(),
            feature_snapshot: FeatureSnapshot::new(),
            model_version: String::new(),
            ts_updated: 0,
            last_ai_explained_at: None,
            unstable: false,
        }
    }

    #[test]
    fn first_prediction_is_always_significant() {
        let candidate = base_prediction(Signal::Up, 60.0);
        assert!(is_significant(None, &candidate, false, false));
    }

    #[test]
    fn confidence_jump_marks_significant() {
        let prev = base_prediction(Signal::Up, 50.0);
        let candidate = base_prediction(Signal::Up, 62.0);
        assert!(is_significant(Some(&prev), &candidate, false, false));
    }

    #[test]
    fn cooldown_blocks_ai_call() {
        let mut prev = base_prediction(Signal::Up, 50.0);
        prev.last_ai_explained_at = Some(1_000_000);
        let mut candidate = base_prediction(Signal::Down, 50.0);
        candidate.last_ai_explained_at = prev.last_ai_explained_at;
        let cfg = crate::config::Config::from_env().prediction;
        let now = 1_000_000 + (cfg.ai_cooldown_sec as i64) * 1000 - 1;
        assert!(!ai_call_eligible(Some(&prev), &candidate, now, &cfg));
    }

    #[test]
    fn cooldown_elapsed_allows_ai_call_on_flip() {
        let mut prev = base_prediction(Signal::Up, 50.0);
        prev.last_ai_explained_at = Some(0);
        let candidate = base_prediction(Signal::Down, 50.0);
        let cfg = crate::config::Config::from_env().prediction;
        let now = (cfg.ai_cooldown_sec as i64) * 1000 + 1;
        assert!(ai_call_eligible(Some(&prev), &candidate, now, &cfg));
    }

    #[test]
    fn event_throttle_suppresses_repeats_within_window() {
        let throttle = EventThrottle::new();
        let cfg = crate::config::Config::from_env().prediction;
        assert!(throttle.should_emit("bot1", "1h", "signal_flip", 0, &cfg));
        assert!(!throttle.should_emit("bot1", "1h", "signal_flip", 1_000, &cfg));
        let later = (cfg.event_throttle_sec as i64) * 1000 + 1;
        assert!(throttle.should_emit("bot1", "1h", "signal_flip", later, &cfg));
    }

    #[test]
    fn four_flips_in_30min_marks_unstable() {
        let throttle = EventThrottle::new();
        assert!(!throttle.record_flip_and_check_unstable("bot1", "1h", 0));
        assert!(!throttle.record_flip_and_check_unstable("bot1", "1h", 60_000));
        assert!(!throttle.record_flip_and_check_unstable("bot1", "1h", 120_000));
        assert!(throttle.record_flip_and_check_unstable("bot1", "1h", 180_000));
    }
}
