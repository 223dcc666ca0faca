// =============================================================================
// AI Quality Gate (C10)
// =============================================================================
//
// `evaluate_ai_quality_gate` is the per-hour call budget + dedup + priority
// controller that C11 (composite DAG runner) and C9 (refresh service)
// consult before ever invoking an AI explainer through C6. Rolling-hour
// window, `decisionHash` dedup, budget-pressure back-off forcing only
// `high` priority through once `budget_pressure_consecutive >= 3`.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::ai::types::{AiQualityGateRollingState, Priority};
use crate::hashing::hash_stable_object;

const HOUR_MS: i64 = 60 * 60 * 1000;
const BUDGET_PRESSURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateInput {
    pub timeframe: String,
    pub now_ms: i64,
    pub signal_flipped: bool,
    pub signal_flip_within_ms: Option<i64>,
    pub confidence_jump: f64,
    pub prediction_hash: String,
    pub history_hash: String,
    pub per_hour_call_cap: u32,
    pub budget_pressure_consecutive: u32,
}

#[derive(Debug, Clone)]
pub struct QualityGateDecision {
    pub allow: bool,
    pub reason_codes: Vec<String>,
    pub priority: Priority,
    pub decision_hash: String,
    pub prediction_hash: String,
    pub history_hash: String,
}

/// §4.10. Caller persists `state` after the call regardless of `allow`, so
/// the rolling window and dedup hashes stay current.
pub fn evaluate_ai_quality_gate(
    input: &QualityGateInput,
    state: &mut AiQualityGateRollingState,
) -> QualityGateDecision {
    if input.now_ms - state.window_started_at >= HOUR_MS {
        state.window_started_at = input.now_ms;
        state.ai_calls_last_hour = 0;
        state.high_priority_calls_last_hour = 0;
    }

    let decision_hash = hash_stable_object(&serde_json::json!({
        "prediction": input.prediction_hash,
        "history": input.history_hash,
    }));

    let priority = if input.signal_flipped && input.signal_flip_within_ms.unwrap_or(i64::MAX) <= 10 * 60 * 1000 {
        Priority::High
    } else if input.confidence_jump >= 15.0 {
        Priority::Medium
    } else {
        Priority::Low
    };

    let mut reason_codes = Vec::new();
    let mut allow = true;

    if state.last_explained_decision_hash.as_deref() == Some(decision_hash.as_str()) {
        allow = false;
        reason_codes.push("duplicate_decision".to_string());
    }

    if allow && state.ai_calls_last_hour >= input.per_hour_call_cap {
        allow = false;
        reason_codes.push("hourly_call_cap_exceeded".to_string());
    }

    if allow
        && input.budget_pressure_consecutive >= BUDGET_PRESSURE_THRESHOLD
        && priority != Priority::High
    {
        allow = false;
        reason_codes.push("budget_pressure_backoff".to_string());
    }

    if allow {
        state.ai_calls_last_hour += 1;
        if priority == Priority::High {
            state.high_priority_calls_last_hour += 1;
        }
        state.last_ai_call_ts = Some(input.now_ms);
        state.last_explained_prediction_hash = Some(input.prediction_hash.clone());
        state.last_explained_history_hash = Some(input.history_hash.clone());
        state.last_explained_decision_hash = Some(decision_hash.clone());
        reason_codes.push("allowed".to_string());
    }

    QualityGateDecision {
        allow,
        reason_codes,
        priority,
        decision_hash,
        prediction_hash: input.prediction_hash.clone(),
        history_hash: input.history_hash.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input(now_ms: i64) -> QualityGateInput {
        QualityGateInput {
            timeframe: "1h".to_string(),
            now_ms,
            signal_flipped: false,
            signal_flip_within_ms: None,
            confidence_jump: 0.0,
            prediction_hash: "ph1".to_string(),
            history_hash: "hh1".to_string(),
            per_hour_call_cap: 10,
            budget_pressure_consecutive: 0,
        }
    }

    #[test]
    fn high_priority_on_recent_flip() {
        let mut input = base_input(0);
        input.signal_flipped = true;
        input.signal_flip_within_ms = Some(5 * 60 * 1000);
        let mut state = AiQualityGateRollingState::new(0);
        let decision = evaluate_ai_quality_gate(&input, &mut state);
        assert_eq!(decision.priority, Priority::High);
        assert!(decision.allow);
    }

    #[test]
    fn medium_priority_on_confidence_jump() {
        let mut input = base_input(0);
        input.confidence_jump = 20.0;
        let mut state = AiQualityGateRollingState::new(0);
        let decision = evaluate_ai_quality_gate(&input, &mut state);
        assert_eq!(decision.priority, Priority::Medium);
    }

    #[test]
    fn duplicate_decision_hash_is_blocked() {
        let input = base_input(0);
        let mut state = AiQualityGateRollingState::new(0);
        let first = evaluate_ai_quality_gate(&input, &mut state);
        assert!(first.allow);
        let second = evaluate_ai_quality_gate(&input, &mut state);
        assert!(!second.allow);
        assert!(second.reason_codes.contains(&"duplicate_decision".to_string()));
    }

    #[test]
    fn budget_pressure_forces_only_high_priority() {
        let mut input = base_input(0);
        input.budget_pressure_consecutive = 3;
        input.prediction_hash = "distinct".to_string();
        let mut state = AiQualityGateRollingState::new(0);
        let low_priority = evaluate_ai_quality_gate(&input, &mut state);
        assert!(!low_priority.allow);

        let mut high_input = input.clone();
        high_input.signal_flipped = true;
        high_input.signal_flip_within_ms = Some(1_000);
        high_input.history_hash = "hh-high".to_string();
        let high_priority = evaluate_ai_quality_gate(&high_input, &mut state);
        assert!(high_priority.allow);
        assert_eq!(high_priority.priority, Priority::High);
    }

    #[test]
    fn hourly_window_resets_after_an_hour() {
        let mut state = AiQualityGateRollingState::new(0);
        state.ai_calls_last_hour = 999;

        let mut later_input = base_input(HOUR_MS + 1);
        later_input.history_hash = "hh-later".to_string();
        let after_reset = evaluate_ai_quality_gate(&later_input, &mut state);
        assert!(after_reset.allow);
        assert_eq!(state.ai_calls_last_hour, 1);
    }
}
