// =============================================================================
// Trigger Engine (C8)
// =============================================================================
//
// `should_refresh_tf` decides whether a timeframe's prediction should be
// recomputed this tick: scheduled-due check, a set of hysteresis-bucketed
// and threshold-crossing triggers, then debounce. Stateful but pure in the
// sense every input/output is explicit — grounded on the teacher's
// `signals::signal_decay` pattern of a small struct carrying timestamps
// across calls.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::config::PredictionConfig;
use crate::signal::types::TriggerDebounceState;

/// A value bucket with hysteresis: enters only once the value rises above
/// `enter`, exits only once it falls below `enter * hysteresis_ratio` (§4.8).
#[derive(Debug, Clone, Copy)]
pub struct HysteresisBucket {
    pub enter: f64,
    pub hysteresis_ratio: f64,
}

impl HysteresisBucket {
    pub fn classify(&self, value: f64, previously_entered: bool) -> bool {
        if previously_entered {
            value >= self.enter * self.hysteresis_ratio
        } else {
            value >= self.enter
        }
    }
}

/// Snapshot of the scalar/bucket inputs the trigger engine evaluates each
/// tick. `None` fields are simply skipped — not every feed publishes every
/// metric every tick.
#[derive(Debug, Clone, Default)]
pub struct TriggerInput {
    pub now_ms: i64,
    pub last_updated_ms: i64,
    pub timeframe: String,

    pub prev_trend_bucket_entered: bool,
    pub trend_rank: Option<f64>,
    pub trend_enter: f64,

    pub prev_rsi_bucket_entered: bool,
    pub rsi: Option<f64>,
    pub rsi_enter: f64,

    pub prev_vol_bucket_entered: bool,
    pub vol_rank: Option<f64>,
    pub vol_enter: f64,

    pub prev_signal_bias_up: Option<bool>,
    pub signal_bias_up: Option<bool>,

    pub breakout_score: Option<f64>,
    pub prev_breakout_above: bool,

    pub funding_rate: Option<f64>,
    pub prev_funding_above: bool,

    pub basis_bps: Option<f64>,
    pub prev_basis_above: bool,

    pub data_gap: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerBucketState {
    pub trend_entered: bool,
    pub rsi_entered: bool,
    pub vol_entered: bool,
    pub breakout_above: bool,
    pub funding_above: bool,
    pub basis_above: bool,
}

#[derive(Debug, Clone)]
pub struct RefreshDecision {
    pub refresh: bool,
    pub reasons: Vec<String>,
    pub trigger_state: TriggerDebounceState,
    pub bucket_state: TriggerBucketState,
}

const BREAKOUT_THRESHOLD: f64 = 0.8;
const FUNDING_THRESHOLD: f64 = 0.0005;
const BASIS_THRESHOLD_BPS: f64 = 8.0;

/// §4.8. `prev_bucket_state` carries hysteresis state across ticks,
/// `debounce_state` carries candidate bookkeeping; both are returned updated.
pub fn should_refresh_tf(
    input: &TriggerInput,
    prev_bucket_state: &TriggerBucketState,
    debounce_state: &TriggerDebounceState,
    cfg: &PredictionConfig,
) -> RefreshDecision {
    let refresh_interval_ms = cfg.refresh_interval(&input.timeframe).as_millis() as i64;
    if input.now_ms - input.last_updated_ms >= refresh_interval_ms {
        return RefreshDecision {
            refresh: true,
            reasons: vec!["scheduled_due".to_string()],
            trigger_state: TriggerDebounceState::default(),
            bucket_state: *prev_bucket_state,
        };
    }

    // `observed_state` is what the bucket classifiers see *this* tick; it is
    // only committed to the returned decision once a refresh actually fires.
    // Until then the carried state must stay at `prev_bucket_state` so an
    // edge that gets debounced away is observed again (and can repeat) on
    // the next evaluation instead of silently latching in (§8 testable
    // property #6).
    let mut observed_state = *prev_bucket_state;
    let mut candidate_reasons = Vec::new();

    if input.data_gap {
        candidate_reasons.push("data_gap".to_string());
    }

    if let (Some(prev), Some(cur)) = (input.prev_signal_bias_up, input.signal_bias_up) {
        if prev != cur {
            candidate_reasons.push("trend_flip".to_string());
        }
    }

    if let Some(trend_rank) = input.trend_rank {
        let bucket = HysteresisBucket { enter: input.trend_enter, hysteresis_ratio: cfg.hysteresis_ratio };
        let entered = bucket.classify(trend_rank, prev_bucket_state.trend_entered);
        if entered != prev_bucket_state.trend_entered {
            candidate_reasons.push("trend_rank_bucket_change".to_string());
        }
        observed_state.trend_entered = entered;
    }

    if let Some(rsi) = input.rsi {
        let bucket = HysteresisBucket { enter: input.rsi_enter, hysteresis_ratio: cfg.hysteresis_ratio };
        let entered = bucket.classify(rsi, prev_bucket_state.rsi_entered);
        if entered != prev_bucket_state.rsi_entered {
            candidate_reasons.push("rsi_bucket_change".to_string());
        }
        observed_state.rsi_entered = entered;
    }

    if let Some(vol_rank) = input.vol_rank {
        let bucket = HysteresisBucket { enter: input.vol_enter, hysteresis_ratio: cfg.hysteresis_ratio };
        let entered = bucket.classify(vol_rank, prev_bucket_state.vol_entered);
        if entered != prev_bucket_state.vol_entered {
            candidate_reasons.push("vol_rank_bucket_change".to_string());
        }
        observed_state.vol_entered = entered;
    }

    if let Some(score) = input.breakout_score {
        let above = score >= BREAKOUT_THRESHOLD;
        if above != prev_bucket_state.breakout_above {
            candidate_reasons.push("breakout_score_crossing".to_string());
        }
        observed_state.breakout_above = above;
    }

    if let Some(funding) = input.funding_rate {
        let above = funding.abs() >= FUNDING_THRESHOLD;
        if above != prev_bucket_state.funding_above {
            candidate_reasons.push("funding_magnitude_crossing".to_string());
        }
        observed_state.funding_above = above;
    }

    if let Some(basis) = input.basis_bps {
        let above = basis.abs() >= BASIS_THRESHOLD_BPS;
        if above != prev_bucket_state.basis_above {
            candidate_reasons.push("basis_crossing".to_string());
        }
        observed_state.basis_above = above;
    }

    if candidate_reasons.is_empty() {
        return RefreshDecision {
            refresh: false,
            reasons: vec![],
            trigger_state: debounce_state.clone(),
            bucket_state: *prev_bucket_state,
        };
    }

    // Debounce: evaluate the first candidate reason against the carried
    // debounce state (§4.8). Multiple simultaneous reasons all ride along
    // once any one of them clears the debounce bar.
    let reason = candidate_reasons[0].clone();
    let mut new_state = debounce_state.clone();

    let repeats = new_state.candidate_reason.as_deref() == Some(reason.as_str());
    if repeats {
        new_state.candidate_count += 1;
    } else {
        new_state.candidate_reason = Some(reason.clone());
        new_state.candidate_count = 1;
        new_state.last_trigger_candidate_at_ms = Some(input.now_ms);
    }

    let elapsed_ok = new_state
        .last_trigger_candidate_at_ms
        .map(|t| input.now_ms - t >= (cfg.trigger_debounce_sec as i64) * 1000)
        .unwrap_or(false);

    if new_state.candidate_count >= 2 || elapsed_ok {
        RefreshDecision {
            refresh: true,
            reasons: candidate_reasons,
            trigger_state: TriggerDebounceState::default(),
            bucket_state: observed_state,
        }
    } else {
        RefreshDecision {
            refresh: false,
            reasons: vec![],
            trigger_state: new_state,
            bucket_state: *prev_bucket_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PredictionConfig {
        crate::config::Config::from_env().prediction
    }

    #[test]
    fn scheduled_due_forces_refresh_and_resets_state() {
        let input = TriggerInput {
            now_ms: 1_000_000,
            last_updated_ms: 0,
            timeframe: "1h".to_string(),
            ..Default::default()
        };
        let decision = should_refresh_tf(
            &input,
            &TriggerBucketState::default(),
            &TriggerDebounceState::default(),
            &cfg(),
        );
        assert!(decision.refresh);
        assert_eq!(decision.reasons, vec!["scheduled_due".to_string()]);
    }

    #[test]
    fn hysteresis_prevents_chatter_inside_band() {
        let c = cfg();
        let bucket = HysteresisBucket { enter: 70.0, hysteresis_ratio: c.hysteresis_ratio };
        // enters at 70, exit band below 42; oscillating between 50 and 65
        // (inside [exit, enter)) must never flip once entered.
        assert!(!bucket.classify(65.0, false));
        let entered = bucket.classify(75.0, false);
        assert!(entered);
        assert!(bucket.classify(50.0, true));
        assert!(bucket.classify(65.0, true));
    }

    #[test]
    fn single_transient_trigger_does_not_refresh() {
        let input = TriggerInput {
            now_ms: 1_000,
            last_updated_ms: 900,
            timeframe: "1h".to_string(),
            rsi: Some(80.0),
            rsi_enter: 70.0,
            ..Default::default()
        };
        let decision = should_refresh_tf(
            &input,
            &TriggerBucketState::default(),
            &TriggerDebounceState::default(),
            &cfg(),
        );
        assert!(!decision.refresh);
        assert_eq!(decision.trigger_state.candidate_count, 1);
    }

    #[test]
    fn repeated_reason_on_second_evaluation_fires() {
        let c = cfg();
        let input = TriggerInput {
            now_ms: 1_000,
            last_updated_ms: 900,
            timeframe: "1h".to_string(),
            rsi: Some(80.0),
            rsi_enter: 70.0,
            ..Default::default()
        };
        let first = should_refresh_tf(
            &input,
            &TriggerBucketState::default(),
            &TriggerDebounceState::default(),
            &c,
        );
        assert!(!first.refresh);

        let second_input = TriggerInput { now_ms: 1_500, ..input };
        let second = should_refresh_tf(&second_input, &first.bucket_state, &first.trigger_state, &c);
        assert!(second.refresh);
        assert!(second.reasons.contains(&"rsi_bucket_change".to_string()));
    }
}
