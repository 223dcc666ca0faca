// =============================================================================
// AI Quality-Gate Shared Types (C10)
// =============================================================================

use serde::{Deserialize, Serialize};

/// §3 `AiQualityGateRollingState`. One instance per `(bot, timeframe)`,
/// owned by the caller (the refresh service / composite runner) and passed
/// into `evaluate_ai_quality_gate` each tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiQualityGateRollingState {
    pub window_started_at: i64,
    pub ai_calls_last_hour: u32,
    pub high_priority_calls_last_hour: u32,
    pub last_ai_call_ts: Option<i64>,
    pub last_explained_prediction_hash: Option<String>,
    pub last_explained_history_hash: Option<String>,
    pub last_explained_decision_hash: Option<String>,
}

impl AiQualityGateRollingState {
    pub fn new(now_ms: i64) -> Self {
        AiQualityGateRollingState {
            window_started_at: now_ms,
            ai_calls_last_hour: 0,
            high_priority_calls_last_hour: 0,
            last_ai_call_ts: None,
            last_explained_prediction_hash: None,
            last_explained_history_hash: None,
            last_explained_decision_hash: None,
        }
    }
}

impl Default for AiQualityGateRollingState {
    fn default() -> Self {
        Self::new(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}
