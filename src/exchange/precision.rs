// =============================================================================
// Precision / Min-Notional Normalizer (C2)
// =============================================================================
//
// Rounds prices/quantities down to a venue's tick/step size and rejects
// orders below the venue's minimum quantity or minimum notional. Missing
// `SymbolMeta` fields mean "no constraint" (§3).
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;

/// Cached per venue+symbol for 10 minutes by the catalog cache (C3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolMeta {
    pub price_step: Option<f64>,
    pub qty_step: Option<f64>,
    pub price_precision: Option<u32>,
    pub qty_precision: Option<u32>,
    pub min_qty: Option<f64>,
    pub min_notional: Option<f64>,
}

/// Round `x` down to the nearest multiple of `step`, tolerant of float
/// representation error via a small epsilon before flooring.
fn floor_to_step(x: f64, step: f64) -> f64 {
    if step <= 0.0 || !step.is_finite() {
        return x;
    }
    (x / step + 1e-12).floor() * step
}

/// Round a price down to `meta.price_step` (no-op if unset).
pub fn normalize_price(price: f64, meta: &SymbolMeta) -> f64 {
    match meta.price_step {
        Some(step) if step > 0.0 => floor_to_step(price, step),
        _ => price,
    }
}

/// Round a quantity down to `meta.qty_step` (no-op if unset).
pub fn normalize_qty(qty: f64, meta: &SymbolMeta) -> f64 {
    match meta.qty_step {
        Some(step) if step > 0.0 => floor_to_step(qty, step),
        _ => qty,
    }
}

/// Reject orders below the venue's minimum quantity or minimum notional.
pub fn check_mins(price: f64, qty: f64, meta: &SymbolMeta) -> Result<(), ExchangeError> {
    if let Some(min_qty) = meta.min_qty {
        if qty < min_qty {
            return Err(ExchangeError::QtyBelowMinimum { qty, min_qty });
        }
    }
    if let Some(min_notional) = meta.min_notional {
        let notional = price * qty;
        if notional < min_notional {
            return Err(ExchangeError::NotionalBelowMinimum {
                notional,
                min_notional,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> SymbolMeta {
        SymbolMeta {
            price_step: Some(0.01),
            qty_step: Some(0.001),
            price_precision: Some(2),
            qty_precision: Some(3),
            min_qty: Some(0.01),
            min_notional: Some(5.0),
        }
    }

    #[test]
    fn normalization_never_rounds_up() {
        let m = meta();
        for p in [10.0, 10.004, 10.009, 123.456789] {
            assert!(normalize_price(p, &m) <= p + 1e-9);
        }
        for q in [1.0, 1.0009, 0.0015] {
            assert!(normalize_qty(q, &m) <= q + 1e-9);
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let m = meta();
        let once = normalize_price(10.0049, &m);
        let twice = normalize_price(once, &m);
        assert!((once - twice).abs() < 1e-9);

        let once_q = normalize_qty(1.23456, &m);
        let twice_q = normalize_qty(once_q, &m);
        assert!((once_q - twice_q).abs() < 1e-9);
    }

    #[test]
    fn missing_step_is_a_noop() {
        let m = SymbolMeta::default();
        assert_eq!(normalize_price(10.123456, &m), 10.123456);
        assert_eq!(normalize_qty(1.23456, &m), 1.23456);
    }

    #[test]
    fn s2_min_notional_rejection_from_spec() {
        let m = SymbolMeta {
            price_step: None,
            qty_step: Some(0.001),
            price_precision: None,
            qty_precision: None,
            min_qty: Some(0.01),
            min_notional: Some(5.0),
        };
        let err = check_mins(10.0, 0.005, &m).unwrap_err();
        assert_eq!(
            err,
            ExchangeError::QtyBelowMinimum {
                qty: 0.005,
                min_qty: 0.01
            }
        );
        assert!(err.is_domain_rejection());
    }

    #[test]
    fn min_notional_checked_after_qty_passes() {
        let m = meta();
        // qty passes minQty but price*qty < minNotional.
        let err = check_mins(1.0, 0.02, &m).unwrap_err();
        assert!(matches!(err, ExchangeError::NotionalBelowMinimum { .. }));
    }
}
