// =============================================================================
// P2B Adapter (C4) — HMAC-SHA512 hex over base64-encoded body
// =============================================================================

use async_trait::async_trait;
use base64::Engine;

use crate::error::ExchangeError;
use crate::exchange::adapter::{
    dedup_trades_by_id, open_orders_window_start_ms, Balance, ExchangeAdapter, MidPrice, MyTrade,
    Order, OrderStatus, OrderType, Quote, Side, TradeQuery,
};
use crate::exchange::client::{api_key_header, parse_num, parse_str, signature_header, SignedHttpClient};
use crate::exchange::precision::{check_mins, normalize_price, normalize_qty, SymbolMeta};
use crate::exchange::signing::{timestamp_ms, PreHashStyle, SignAlgo, VenueSignerSpec};
use crate::exchange::symbol::{CanonicalSymbol, P2bAdapter as P2bSymbols, VenueSymbolAdapter};

pub struct P2bAdapter {
    client: SignedHttpClient,
    symbols: P2bSymbols,
}

impl P2bAdapter {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, min_gap_ms: u64) -> Self {
        Self {
            client: SignedHttpClient::new(
                "p2b",
                "https://api.p2pb2b.com",
                api_key,
                secret,
                VenueSignerSpec {
                    venue: "p2b",
                    algo: SignAlgo::HmacSha512Hex,
                    style: PreHashStyle::TimestampMethodPathQueryBody,
                },
                vec![api_key_header("X-TXC-APIKEY"), signature_header("X-TXC-SIGNATURE")],
                min_gap_ms,
            ),
            symbols: P2bSymbols,
        }
    }

    /// P2B signs `base64(json_body)` rather than the raw body; wraps
    /// `signed_post` accordingly since its body carries `request`/`nonce`
    /// fields the generic pre-hash assembly doesn't know about.
    async fn p2b_post(&self, path: &str, mut body: serde_json::Value) -> Result<serde_json::Value, ExchangeError> {
        body["request"] = serde_json::Value::String(path.to_string());
        body["nonce"] = serde_json::Value::String(timestamp_ms().to_string());
        let encoded = base64::engine::general_purpose::STANDARD.encode(body.to_string());
        self.client.signed_post(path, serde_json::Value::String(encoded)).await
    }

    fn meta_for(&self, symbol: &CanonicalSymbol) -> SymbolMeta {
        self.client
            .catalog
            .get_meta(symbol.as_str())
            .or_else(|| self.client.catalog.get_meta_stale(symbol.as_str()))
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExchangeAdapter for P2bAdapter {
    fn venue(&self) -> &'static str {
        "p2b"
    }

    async fn get_ticker(&self, symbol: &CanonicalSymbol) -> Result<MidPrice, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let resp = self
            .client
            .signed_get(&format!("/api/v2/public/ticker?market={venue_symbol}"), vec![])
            .await?;
        let data = resp.get("result").cloned().unwrap_or(resp);
        let last = parse_num(&data, "last").unwrap_or(0.0);
        let bid = parse_num(&data, "bid");
        let ask = parse_num(&data, "ask");
        if bid.is_none() && ask.is_none() && last == 0.0 {
            return Err(ExchangeError::MissingPrices);
        }
        Ok(MidPrice::compute(bid, ask, last, chrono::Utc::now().timestamp_millis()))
    }

    async fn get_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let resp = self.p2b_post("/api/v2/io/account/balances", serde_json::json!({})).await?;
        let rows = resp
            .get("result")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|(asset, v)| Balance {
                asset,
                free: parse_num(&v, "available").unwrap_or(0.0),
                locked: parse_num(&v, "freeze").unwrap_or(0.0),
            })
            .collect())
    }

    async fn get_open_orders(&self, symbol: &CanonicalSymbol) -> Result<Vec<Order>, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let body = serde_json::json!({
            "market": venue_symbol,
            "offset": 0,
            "limit": 100,
            "since": open_orders_window_start_ms(timestamp_ms()),
        });
        let resp = self.p2b_post("/api/v2/io/orders", body).await?;
        let rows = resp.get("result").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|o| {
                Some(Order {
                    id: o.get("orderId").map(|v| v.to_string())?,
                    symbol: symbol.clone(),
                    side: if parse_str(o, "side") == Some("sell") { Side::Sell } else { Side::Buy },
                    price: parse_num(o, "price").unwrap_or(0.0),
                    qty: parse_num(o, "amount").unwrap_or(0.0),
                    status: OrderStatus::Open,
                    client_order_id: None,
                })
            })
            .collect())
    }

    async fn place_order(&self, quote: &Quote) -> Result<Order, ExchangeError> {
        quote.validate()?;
        let meta = self.meta_for(&quote.symbol);
        let price = quote.price.map(|p| normalize_price(p, &meta));
        let qty = normalize_qty(quote.qty, &meta);
        if let Some(p) = price {
            check_mins(p, qty, &meta)?;
        }
        let venue_symbol = self.symbols.to_venue(&quote.symbol)?;
        let body = serde_json::json!({
            "market": venue_symbol,
            "side": match quote.side { Side::Buy => "buy", Side::Sell => "sell" },
            "amount": qty.to_string(),
            "price": price.unwrap_or(0.0).to_string(),
        });
        let resp = self.p2b_post("/api/v2/io/orders", body).await?;
        let data = resp.get("result").cloned().unwrap_or(resp);
        Ok(Order {
            id: data
                .get("orderId")
                .map(|v| v.to_string())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            symbol: quote.symbol.clone(),
            side: quote.side,
            price: price.unwrap_or(0.0),
            qty,
            status: OrderStatus::Open,
            client_order_id: quote.client_order_id.clone(),
        })
    }

    async fn cancel_order(&self, symbol: &CanonicalSymbol, order_id: &str) -> Result<(), ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let order_id: i64 = order_id.parse().unwrap_or(0);
        let body = serde_json::json!({ "market": venue_symbol, "orderId": order_id });
        match self.p2b_post("/api/v2/io/orders/cancel", body).await {
            Ok(_) => Ok(()),
            Err(ExchangeError::BaseUrlOrPathInvalid { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn cancel_all(&self, symbol: Option<&CanonicalSymbol>) -> Result<(), ExchangeError> {
        match symbol {
            Some(s) => {
                let venue_symbol = self.symbols.to_venue(s)?;
                let body = serde_json::json!({ "market": venue_symbol });
                self.p2b_post("/api/v2/io/orders/cancel_all", body).await?;
                Ok(())
            }
            // Account-wide bulk cancel; P2B's cancel_all accepts an empty
            // body to mean "every market" (§4.4 `cancelAll(symbol?)`).
            None => {
                self.p2b_post("/api/v2/io/orders/cancel_all", serde_json::json!({})).await?;
                Ok(())
            }
        }
    }

    async fn get_my_trades(
        &self,
        symbol: &CanonicalSymbol,
        query: TradeQuery,
    ) -> Result<Vec<MyTrade>, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let mut body = serde_json::json!({ "market": venue_symbol, "offset": 0 });
        if let Some(limit) = query.limit {
            body["limit"] = serde_json::Value::from(limit);
        }
        let resp = self.p2b_post("/api/v2/io/account/trade_history", body).await?;
        let rows = resp.get("result").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let mut trades: Vec<MyTrade> = rows
            .iter()
            .filter_map(|t| {
                let qty = parse_num(t, "amount").unwrap_or(0.0);
                let price = parse_num(t, "price").unwrap_or(0.0);
                Some(MyTrade {
                    id: t.get("id").map(|v| v.to_string())?,
                    order_id: t.get("dealOrderId").map(|v| v.to_string()),
                    side: if parse_str(t, "type") == Some("sell") { Side::Sell } else { Side::Buy },
                    price,
                    qty,
                    notional: price * qty,
                    timestamp_ms: t.get("time").and_then(|v| v.as_f64()).map(|s| (s * 1000.0) as i64).unwrap_or(0),
                })
            })
            .collect();
        trades.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        Ok(dedup_trades_by_id(trades))
    }
}
