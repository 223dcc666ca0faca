// =============================================================================
// Exchange Adapter Contract (C4)
// =============================================================================
//
// The normalized shapes below (`Quote`, `Order`, `MyTrade`, `MidPrice`,
// `Balance`) are the exact bit-level contract callers see; venue-specific
// fields never leak past a venue module. `ExchangeAdapter` is the trait
// every venue implements, grounded on the pack's `usealtoal-edgelord`
// `port::outbound::exchange` trait shape (`async_trait`, typed result enum)
// generalized from prediction-market order execution to spot/futures
// ticker+balance+order+trade operations.
// =============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;
use crate::exchange::symbol::CanonicalSymbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
    Unknown,
}

/// Order intent submitted to [`ExchangeAdapter::place_order`] (§3 `Quote`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: CanonicalSymbol,
    pub side: Side,
    pub kind: OrderType,
    pub price: Option<f64>,
    pub qty: f64,
    pub quote_qty: Option<f64>,
    pub post_only: bool,
    pub client_order_id: Option<String>,
}

impl Quote {
    /// §3 invariant: limit requires price>0; market-buy MAY use quoteQty in
    /// lieu of qty where the venue supports it.
    pub fn validate(&self) -> Result<(), ExchangeError> {
        match self.kind {
            OrderType::Limit => match self.price {
                Some(p) if p > 0.0 => Ok(()),
                _ => Err(ExchangeError::UnsupportedOrderType(
                    "limit order requires price > 0".to_string(),
                )),
            },
            OrderType::Market => {
                if self.qty <= 0.0 && self.quote_qty.unwrap_or(0.0) <= 0.0 {
                    return Err(ExchangeError::UnsupportedOrderType(
                        "market order requires qty or quoteQty > 0".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: CanonicalSymbol,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
    pub status: OrderStatus,
    pub client_order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyTrade {
    pub id: String,
    pub order_id: Option<String>,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
    pub notional: f64,
    pub timestamp_ms: i64,
}

impl MyTrade {
    /// Derive `price = notional/qty` when only order-level fills are
    /// available and the average price is missing (§4.4).
    pub fn derive_price_from_notional(notional: f64, qty: f64) -> Option<f64> {
        if qty > 0.0 {
            Some(notional / qty)
        } else {
            None
        }
    }
}

/// De-duplicate a newest-first trade list by trade id, preserving order of
/// first occurrence (§4.4).
pub fn dedup_trades_by_id(trades: Vec<MyTrade>) -> Vec<MyTrade> {
    let mut seen = std::collections::HashSet::new();
    trades
        .into_iter()
        .filter(|t| seen.insert(t.id.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MidPrice {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub mid: f64,
    pub last: f64,
    pub ts: i64,
}

impl MidPrice {
    /// `mid` falls back to `last` when bid/ask are missing (§3 invariant).
    pub fn compute(bid: Option<f64>, ask: Option<f64>, last: f64, ts: i64) -> Self {
        let mid = match (bid, ask) {
            (Some(b), Some(a)) => (b + a) / 2.0,
            _ => last,
        };
        MidPrice { bid, ask, mid, last, ts }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

/// Options accepted by [`ExchangeAdapter::get_my_trades`].
#[derive(Debug, Clone, Default)]
pub struct TradeQuery {
    pub start_ms: Option<i64>,
    pub limit: Option<u32>,
}

/// Canonical operation surface every venue implements identically (§4.4).
/// Open-order queries MUST widen the server-side time window to at least
/// 24h so recently placed orders remain visible after the venue's default
/// window — implementations enforce this internally, the trait only names
/// the contract.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn venue(&self) -> &'static str;

    async fn get_ticker(&self, symbol: &CanonicalSymbol) -> Result<MidPrice, ExchangeError>;

    async fn get_balances(&self) -> Result<Vec<Balance>, ExchangeError>;

    /// Returns open orders only.
    async fn get_open_orders(&self, symbol: &CanonicalSymbol) -> Result<Vec<Order>, ExchangeError>;

    async fn place_order(&self, quote: &Quote) -> Result<Order, ExchangeError>;

    /// `not_found` is tolerated (treated as already-canceled), not an error.
    async fn cancel_order(&self, symbol: &CanonicalSymbol, order_id: &str)
        -> Result<(), ExchangeError>;

    async fn cancel_all(&self, symbol: Option<&CanonicalSymbol>) -> Result<(), ExchangeError>;

    /// Newest-first, deduplicated by trade id.
    async fn get_my_trades(
        &self,
        symbol: &CanonicalSymbol,
        query: TradeQuery,
    ) -> Result<Vec<MyTrade>, ExchangeError>;
}

/// Minimum window (ms) every adapter widens its open-orders query to (§4.4).
pub const OPEN_ORDERS_MIN_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Start-of-window timestamp an open-orders query should request, given the
/// current time, so a venue whose default window is shorter than
/// `OPEN_ORDERS_MIN_WINDOW_MS` doesn't drop recently placed orders (§4.4).
pub fn open_orders_window_start_ms(now_ms: i64) -> i64 {
    now_ms - OPEN_ORDERS_MIN_WINDOW_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_price_falls_back_to_last() {
        let mp = MidPrice::compute(None, None, 100.0, 1);
        assert_eq!(mp.mid, 100.0);
        let mp2 = MidPrice::compute(Some(99.0), Some(101.0), 100.0, 1);
        assert_eq!(mp2.mid, 100.0);
    }

    #[test]
    fn quote_validation_rejects_zero_price_limit() {
        let q = Quote {
            symbol: CanonicalSymbol::parse("BTC/USDT").unwrap(),
            side: Side::Buy,
            kind: OrderType::Limit,
            price: Some(0.0),
            qty: 1.0,
            quote_qty: None,
            post_only: false,
            client_order_id: None,
        };
        assert!(q.validate().is_err());
    }

    #[test]
    fn quote_validation_allows_market_quote_qty_only() {
        let q = Quote {
            symbol: CanonicalSymbol::parse("BTC/USDT").unwrap(),
            side: Side::Buy,
            kind: OrderType::Market,
            price: None,
            qty: 0.0,
            quote_qty: Some(50.0),
            post_only: false,
            client_order_id: None,
        };
        assert!(q.validate().is_ok());
    }

    #[test]
    fn trade_dedup_keeps_first_occurrence() {
        let mk = |id: &str| MyTrade {
            id: id.to_string(),
            order_id: None,
            side: Side::Buy,
            price: 1.0,
            qty: 1.0,
            notional: 1.0,
            timestamp_ms: 0,
        };
        let trades = vec![mk("a"), mk("b"), mk("a")];
        let deduped = dedup_trades_by_id(trades);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn derive_price_from_notional() {
        assert_eq!(MyTrade::derive_price_from_notional(100.0, 2.0), Some(50.0));
        assert_eq!(MyTrade::derive_price_from_notional(100.0, 0.0), None);
    }
}
