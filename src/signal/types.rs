// =============================================================================
// Signal Pipeline — Shared Types
// =============================================================================
//
// Candle, FeatureSnapshot and PredictionState are the nouns every signal
// subsystem (indicators, SMC, trigger engine, refresh service, AI quality
// gate, composite DAG) passes around. They are kept together here so every
// subsystem imports from one place, the way the teacher keeps `Candle` and
// `CandleKey` together in `market_data`.
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single OHLCV bar. Ascending-time sequences of these feed the indicator
/// and SMC engines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Base-quote turnover for the bar; not part of spec.md's OHLCV core but
    /// kept from the teacher's `market_data::Candle` since several indicator
    /// tests reference it and it costs nothing to carry.
    #[serde(default)]
    pub quote_volume: f64,
    #[serde(default)]
    pub trades_count: u64,
    #[serde(default)]
    pub taker_buy_volume: f64,
    #[serde(default)]
    pub taker_buy_quote_volume: f64,
    #[serde(default = "default_true")]
    pub is_closed: bool,
}

fn default_true() -> bool {
    true
}

/// Discrete directional call produced by the signal pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Up,
    Down,
    Neutral,
}

impl Signal {
    pub fn is_neutral(&self) -> bool {
        matches!(self, Signal::Neutral)
    }

    pub fn flipped(&self, other: Signal) -> bool {
        !self.is_neutral() && !other.is_neutral() && *self != other
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Signal::Up => "up",
            Signal::Down => "down",
            Signal::Neutral => "neutral",
        };
        write!(f, "{s}")
    }
}

/// Opaque key -> value feature bag. Reserved paths are documented in
/// `spec.md` §3 (`emaSpread`, `atr_pct_rank_0_100`, `rsi`, `tags`, …); callers
/// read them with [`FeatureSnapshot::get`] / typed helpers below rather than
/// matching on a closed struct, since the upstream producers (indicators,
/// SMC, regime, news overlay) each own a disjoint subset of paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl FeatureSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&serde_json::Value> {
        self.values.get(path)
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.values.get(path).and_then(|v| v.as_f64())
    }

    pub fn set(&mut self, path: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.values.insert(path.into(), value.into());
    }

    /// Tags live at the reserved `tags` path as a JSON array of strings.
    /// Capped at 5 entries everywhere they are written (§3 invariant).
    pub fn tags(&self) -> Vec<String> {
        self.values
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_tags(&mut self, mut tags: Vec<String>) {
        tags.truncate(5);
        self.values.insert(
            "tags".to_string(),
            serde_json::Value::Array(tags.into_iter().map(serde_json::Value::String).collect()),
        );
    }

    /// Stable fingerprint of the frozen snapshot; used as a cache/partition
    /// key wherever snapshots are compared (C5).
    pub fn stable_hash(&self) -> String {
        let v = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        crate::hashing::hash_stable_object(&v)
    }
}

/// Unique key for a prediction row: `exchange:accountId:SYMBOL:marketType:timeframe`.
pub fn prediction_unique_key(
    exchange: &str,
    account_id: &str,
    symbol: &str,
    market_type: &str,
    timeframe: &str,
) -> String {
    format!("{exchange}:{account_id}:{symbol}:{market_type}:{timeframe}")
}

/// Persisted prediction row (§3 `PredictionState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionState {
    pub unique_key: String,
    pub signal: Signal,
    /// 0..=100
    pub confidence: f64,
    /// 0..=25
    pub expected_move_pct: f64,
    pub tags: Vec<String>,
    pub key_drivers: Vec<String>,
    pub explanation: String,
    pub feature_snapshot: FeatureSnapshot,
    pub model_version: String,
    pub ts_updated: i64,
    pub last_ai_explained_at: Option<i64>,
    /// Marked when >= 4 signal flips occurred within the trailing 30 minutes.
    #[serde(default)]
    pub unstable: bool,
}

impl PredictionState {
    pub fn clamp_fields(&mut self) {
        self.confidence = self.confidence.clamp(0.0, 100.0);
        self.expected_move_pct = self.expected_move_pct.clamp(0.0, 25.0);
        self.tags.truncate(5);
        self.key_drivers.truncate(5);
    }
}

/// Debounce bookkeeping for the trigger engine (§3 `TriggerDebounceState`).
/// Reset whenever a refresh actually fires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerDebounceState {
    pub candidate_reason: Option<String>,
    pub candidate_count: u32,
    pub last_trigger_candidate_at_ms: Option<i64>,
}

impl TriggerDebounceState {
    pub fn reset(&mut self) {
        self.candidate_reason = None;
        self.candidate_count = 0;
        self.last_trigger_candidate_at_ms = None;
    }
}
