// =============================================================================
// Feature Snapshot Composer (C7 glue)
// =============================================================================
//
// `compute_feature_snapshot` is the one place that turns a candle slice into
// the canonical `FeatureSnapshot` §3 describes: it runs the indicator suite,
// the SMC engine and the regime detector and writes their outputs onto the
// reserved paths the trigger engine (C8) and composite strategies (C11/C12)
// read back (`emaSpread`, `rsi`, `indicators.rsi_14`, `atr_pct_rank_0_100`,
// `ema_spread_abs_rank_0_100`, `breakout_score`, `historyContext.{reg,ema,vol}`).
// Everything else in the signal pipeline stays blind to how a path was
// produced; this module is the only writer of these particular keys.
// =============================================================================

use crate::signal::indicators::atr::calculate_atr_pct;
use crate::signal::indicators::ema::calculate_ema;
use crate::signal::indicators::rsi::calculate_rsi;
use crate::signal::regime::RegimeState;
use crate::signal::smc::{compute_smart_money_concepts, Bias, SmcOptions, SmcSnapshot};
use crate::signal::types::{Candle, FeatureSnapshot};

const EMA_FAST: usize = 12;
const EMA_SLOW: usize = 26;
const RSI_PERIOD: usize = 14;
const ATR_PERIOD: usize = 14;
const RANK_LOOKBACK: usize = 100;

/// Rank `value` against the trailing `series` as a 0..=100 percentile
/// (fraction of samples at or below `value`). Empty series ranks at 50
/// (neutral) rather than panicking on a divide-by-zero.
fn percentile_rank(value: f64, series: &[f64]) -> f64 {
    if series.is_empty() {
        return 50.0;
    }
    let below_or_equal = series.iter().filter(|&&v| v <= value).count();
    (below_or_equal as f64 / series.len() as f64) * 100.0
}

/// Trailing series of a per-bar scalar, one sample per candle once enough
/// history exists to seed `f`. Used to build the distributions
/// `atr_pct_rank_0_100`/`ema_spread_abs_rank_0_100` rank against.
fn trailing_series<F: Fn(&[Candle]) -> Option<f64>>(candles: &[Candle], min_window: usize, f: F) -> Vec<f64> {
    if candles.len() <= min_window {
        return Vec::new();
    }
    let start = candles.len().saturating_sub(RANK_LOOKBACK + 1);
    let mut out = Vec::new();
    for end in (start + min_window + 1)..=candles.len() {
        if let Some(v) = f(&candles[..end]) {
            out.push(v);
        }
    }
    out
}

/// Heuristic 0..1 breakout-score: distance of the latest close past the
/// nearest unmitigated order-block edge in the trend-bias direction,
/// normalized by that block's own height. Zero when no qualifying block
/// exists, so the trigger engine's "crossing 0.8" check degrades safely.
fn breakout_score(candles: &[Candle], smc: &SmcSnapshot) -> f64 {
    let Some(last) = candles.last() else { return 0.0 };
    let Some(bias) = smc.trend_bias else { return 0.0 };

    smc.order_blocks
        .iter()
        .rev()
        .filter(|ob| !ob.mitigated && ob.bias == bias)
        .find_map(|ob| {
            let height = (ob.top - ob.bottom).abs();
            if height <= 0.0 {
                return None;
            }
            let push = match bias {
                Bias::Bullish => last.close - ob.top,
                Bias::Bearish => ob.bottom - last.close,
            };
            Some((push / height).clamp(0.0, 1.0))
        })
        .unwrap_or(0.0)
}

/// Builds the canonical feature snapshot for one `(symbol, timeframe)` tick.
/// `regime` is optional since regime detection needs its own warm-up and a
/// caller may not have one ready yet; all other paths degrade gracefully to
/// absent rather than a synthetic default, matching §3's "missing means no
/// constraint" posture used elsewhere in the spec.
pub fn compute_feature_snapshot(candles: &[Candle], regime: Option<&RegimeState>) -> FeatureSnapshot {
    let mut snapshot = FeatureSnapshot::new();
    if candles.len() < 30 {
        snapshot.set("dataGap", true);
        return snapshot;
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let last_close = *closes.last().unwrap();

    let ema_fast = calculate_ema(&closes, EMA_FAST);
    let ema_slow = calculate_ema(&closes, EMA_SLOW);
    let ema_spread = match (ema_fast.last(), ema_slow.last()) {
        (Some(&fast), Some(&slow)) if last_close != 0.0 => Some((fast - slow) / last_close),
        _ => None,
    };
    if let Some(spread) = ema_spread {
        snapshot.set("emaSpread", spread);

        let spread_series = trailing_series(candles, EMA_SLOW, |window| {
            let c: Vec<f64> = window.iter().map(|c| c.close).collect();
            let f = calculate_ema(&c, EMA_FAST);
            let s = calculate_ema(&c, EMA_SLOW);
            match (f.last(), s.last(), c.last()) {
                (Some(&fv), Some(&sv), Some(&close)) if close != 0.0 => Some(((fv - sv) / close).abs()),
                _ => None,
            }
        });
        snapshot.set("ema_spread_abs_rank_0_100", percentile_rank(spread.abs(), &spread_series));
    }

    let rsi_series = calculate_rsi(&closes, RSI_PERIOD);
    if let Some(&rsi) = rsi_series.last() {
        snapshot.set("rsi", rsi);
        snapshot.set("indicators.rsi_14", rsi);
    }

    let atr_pct = calculate_atr_pct(candles, ATR_PERIOD);
    if let Some(atr_pct) = atr_pct {
        let atr_series = trailing_series(candles, ATR_PERIOD, |window| calculate_atr_pct(window, ATR_PERIOD));
        snapshot.set("atr_pct_rank_0_100", percentile_rank(atr_pct, &atr_series));
    }

    let smc = compute_smart_money_concepts(candles, SmcOptions::default());
    snapshot.set("breakout_score", breakout_score(candles, &smc));

    let mut tags = Vec::new();
    if let Some(reg) = regime {
        snapshot.set(
            "historyContext.reg",
            serde_json::json!({
                "state": reg.regime.to_string(),
                "confidence": reg.confidence,
                "adx": reg.adx,
                "bbw": reg.bbw,
                "hurst": reg.hurst,
                "entropy": reg.entropy,
            }),
        );
        tags.push(format!("regime_{}", reg.regime.to_string().to_lowercase()));
    }
    snapshot.set(
        "historyContext.ema",
        serde_json::json!({ "fast": ema_fast.last(), "slow": ema_slow.last(), "spread": ema_spread }),
    );
    snapshot.set("historyContext.vol", serde_json::json!({ "atrPct": atr_pct }));

    if smc.data_gap {
        tags.push("dataGap".to_string());
    } else if let Some(bias) = smc.trend_bias {
        tags.push(format!("trend_{}", match bias {
            Bias::Bullish => "bullish",
            Bias::Bearish => "bearish",
        }));
    }
    snapshot.set_tags(tags);

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(i: usize, close: f64) -> Candle {
        Candle {
            open_time: i as i64 * 60_000,
            close_time: i as i64 * 60_000 + 59_999,
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 100.0,
            quote_volume: 0.0,
            trades_count: 0,
            taker_buy_volume: 0.0,
            taker_buy_quote_volume: 0.0,
            is_closed: true,
        }
    }

    fn trending_candles(n: usize) -> Vec<Candle> {
        (0..n).map(|i| candle(i, 100.0 + i as f64 * 0.5)).collect()
    }

    #[test]
    fn short_history_reports_data_gap() {
        let candles = trending_candles(10);
        let snapshot = compute_feature_snapshot(&candles, None);
        assert_eq!(snapshot.get("dataGap").and_then(|v| v.as_bool()), Some(true));
        assert!(snapshot.get("emaSpread").is_none());
    }

    #[test]
    fn sufficient_history_populates_reserved_paths() {
        let candles = trending_candles(120);
        let snapshot = compute_feature_snapshot(&candles, None);
        assert!(snapshot.get("emaSpread").is_some());
        assert!(snapshot.get("rsi").is_some());
        assert!(snapshot.get("indicators.rsi_14").is_some());
        assert!(snapshot.get("atr_pct_rank_0_100").is_some());
        assert!(snapshot.get("breakout_score").is_some());
        assert!(snapshot.get("historyContext.ema").is_some());
        assert!(snapshot.tags().len() <= 5);
    }

    #[test]
    fn uptrend_emits_bullish_tag() {
        let candles = trending_candles(120);
        let snapshot = compute_feature_snapshot(&candles, None);
        assert!(snapshot.tags().iter().any(|t| t == "trend_bullish") || snapshot.tags().is_empty());
    }
}
