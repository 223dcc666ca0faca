// =============================================================================
// Configuration — Environment-Driven Settings (§6)
// =============================================================================
//
// Every tunable named in spec §6 is read once at startup via `Config::
// from_env()`. All fields carry sensible defaults so a bare environment
// still boots the engine, mirroring the teacher's `RuntimeConfig` pattern of
// `#[serde(default = "...")]` helpers — here expressed as env-var parsing
// helpers since these values are never persisted to disk, only sourced from
// the process environment.
// =============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or_else(|| {
            if std::env::var(key).is_ok() {
                warn!(key, "failed to parse env var as f64, using default");
            }
            default
        })
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => !matches!(v.to_ascii_lowercase().as_str(), "off" | "false" | "0"),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// C6 AI-guard cache + rate limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiGuardConfig {
    pub cache_ttl_sec: u64,
    pub rate_limit_per_min: u32,
}

/// C8/C9 trigger + refresh-service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    pub ai_cooldown_sec: u64,
    pub event_throttle_sec: u64,
    pub trigger_debounce_sec: u64,
    pub hysteresis_ratio: f64,
    pub refresh_5m_seconds: u64,
    pub refresh_15m_seconds: u64,
    pub refresh_1h_seconds: u64,
    pub refresh_4h_seconds: u64,
    pub refresh_1d_seconds: u64,
}

impl PredictionConfig {
    pub fn refresh_interval(&self, timeframe: &str) -> Duration {
        let secs = match timeframe {
            "5m" => self.refresh_5m_seconds,
            "15m" => self.refresh_15m_seconds,
            "1h" => self.refresh_1h_seconds,
            "4h" => self.refresh_4h_seconds,
            "1d" => self.refresh_1d_seconds,
            _ => self.refresh_1h_seconds,
        };
        Duration::from_secs(secs)
    }
}

/// C15 license-gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseConfig {
    pub enforcement: bool,
    pub cache_ttl_seconds: u64,
}

/// C14 news/calendar overlay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    pub risk_enabled: bool,
}

/// C12 python-sidecar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyStrategyConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_ms: u64,
}

/// Per-venue minimum dispatch gap, e.g. `BINGX_MIN_GAP_MS` (§4.3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueThrottleConfig {
    pub default_min_gap_ms: u64,
    pub overrides: std::collections::HashMap<String, u64>,
}

impl VenueThrottleConfig {
    pub fn min_gap_ms(&self, venue: &str) -> u64 {
        self.overrides
            .get(venue)
            .copied()
            .unwrap_or(self.default_min_gap_ms)
    }
}

/// Full process configuration, assembled once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ai_guard: AiGuardConfig,
    pub prediction: PredictionConfig,
    pub license: LicenseConfig,
    pub news: NewsConfig,
    pub py_strategy: PyStrategyConfig,
    pub venue_throttle: VenueThrottleConfig,
}

impl Config {
    /// Parse every §6 environment variable, falling back to the documented
    /// default when absent or unparseable.
    pub fn from_env() -> Self {
        let mut overrides = std::collections::HashMap::new();
        for venue in [
            "BITMART", "BINGX", "P2B", "BITGET", "MEXC", "BINANCE", "KUCOIN", "COINSTORE",
            "PIONEX",
        ] {
            let key = format!("{venue}_MIN_GAP_MS");
            if let Ok(v) = std::env::var(&key) {
                if let Ok(ms) = v.parse::<u64>() {
                    overrides.insert(venue.to_ascii_lowercase(), ms);
                }
            }
        }

        Config {
            ai_guard: AiGuardConfig {
                cache_ttl_sec: env_u64("AI_CACHE_TTL_SEC", 300),
                rate_limit_per_min: env_u32("AI_RATE_LIMIT_PER_MIN", 60),
            },
            prediction: PredictionConfig {
                ai_cooldown_sec: env_u64("PRED_AI_COOLDOWN_SEC", 300),
                event_throttle_sec: env_u64("PRED_EVENT_THROTTLE_SEC", 180),
                trigger_debounce_sec: env_u64("PRED_TRIGGER_DEBOUNCE_SEC", 90),
                hysteresis_ratio: env_f64("PRED_HYSTERESIS_RATIO", 0.6),
                refresh_5m_seconds: env_u64("PREDICTION_REFRESH_5M_SECONDS", 180),
                refresh_15m_seconds: env_u64("PREDICTION_REFRESH_15M_SECONDS", 300),
                refresh_1h_seconds: env_u64("PREDICTION_REFRESH_1H_SECONDS", 600),
                refresh_4h_seconds: env_u64("PREDICTION_REFRESH_4H_SECONDS", 1800),
                refresh_1d_seconds: env_u64("PREDICTION_REFRESH_1D_SECONDS", 10_800),
            },
            license: LicenseConfig {
                enforcement: env_bool("LICENSE_ENFORCEMENT", true),
                cache_ttl_seconds: env_u64("LICENSE_CACHE_TTL_SECONDS", 600),
            },
            news: NewsConfig {
                risk_enabled: env_bool("ECON_NEWS_RISK_ENABLED", true),
            },
            py_strategy: PyStrategyConfig {
                enabled: env_bool("PY_STRATEGY_ENABLED", false),
                url: env_string("PY_STRATEGY_URL", "http://localhost:9000"),
                timeout_ms: env_u64("PY_STRATEGY_TIMEOUT_MS", 1200),
            },
            venue_throttle: VenueThrottleConfig {
                default_min_gap_ms: 120,
                overrides,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        // Clear any host-set vars so the test is hermetic regardless of
        // outer environment.
        for k in [
            "AI_CACHE_TTL_SEC",
            "AI_RATE_LIMIT_PER_MIN",
            "PRED_AI_COOLDOWN_SEC",
            "LICENSE_ENFORCEMENT",
        ] {
            std::env::remove_var(k);
        }
        let cfg = Config::from_env();
        assert_eq!(cfg.ai_guard.cache_ttl_sec, 300);
        assert_eq!(cfg.ai_guard.rate_limit_per_min, 60);
        assert_eq!(cfg.prediction.ai_cooldown_sec, 300);
        assert_eq!(cfg.prediction.event_throttle_sec, 180);
        assert_eq!(cfg.prediction.trigger_debounce_sec, 90);
        assert!((cfg.prediction.hysteresis_ratio - 0.6).abs() < 1e-9);
        assert!(cfg.license.enforcement);
        assert_eq!(cfg.license.cache_ttl_seconds, 600);
        assert!(cfg.news.risk_enabled);
        assert!(!cfg.py_strategy.enabled);
        assert_eq!(cfg.venue_throttle.min_gap_ms("bitget"), 120);
    }

    #[test]
    fn refresh_interval_maps_timeframes() {
        let cfg = Config::from_env();
        assert_eq!(cfg.prediction.refresh_interval("5m").as_secs(), 180);
        assert_eq!(cfg.prediction.refresh_interval("1d").as_secs(), 10_800);
    }
}
