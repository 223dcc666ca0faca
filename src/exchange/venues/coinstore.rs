// =============================================================================
// Coinstore Adapter (C4) — HMAC-SHA256 hex, timestamp+method+path+body
// =============================================================================

use async_trait::async_trait;

use crate::error::ExchangeError;
use crate::exchange::adapter::{
    dedup_trades_by_id, open_orders_window_start_ms, Balance, ExchangeAdapter, MidPrice, MyTrade,
    Order, OrderStatus, OrderType, Quote, Side, TradeQuery,
};
use crate::exchange::client::{api_key_header, parse_num, parse_str, timestamp_header, SignedHttpClient};
use crate::exchange::precision::{check_mins, normalize_price, normalize_qty, SymbolMeta};
use crate::exchange::signing::{timestamp_ms, PreHashStyle, SignAlgo, VenueSignerSpec};
use crate::exchange::symbol::{CanonicalSymbol, CoinstoreAdapter as CoinstoreSymbols, VenueSymbolAdapter};

pub struct CoinstoreAdapter {
    client: SignedHttpClient,
    symbols: CoinstoreSymbols,
}

impl CoinstoreAdapter {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, min_gap_ms: u64) -> Self {
        Self {
            client: SignedHttpClient::new(
                "coinstore",
                "https://api.coinstore.com",
                api_key,
                secret,
                VenueSignerSpec {
                    venue: "coinstore",
                    algo: SignAlgo::HmacSha256Hex,
                    style: PreHashStyle::TimestampMethodPathQueryBody,
                },
                vec![api_key_header("X-CS-APIKEY"), timestamp_header("X-CS-EXPIRES")],
                min_gap_ms,
            ),
            symbols: CoinstoreSymbols,
        }
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
impl ExchangeAdapter for CoinstoreAdapter {
    fn venue(&self) -> &'static str {
        "coinstore"
    }

    async fn get_ticker(&self, symbol: &CanonicalSymbol) -> Result<MidPrice, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let resp = self
            .client
            .signed_get(&format!("/api/v1/market/tickers/{venue_symbol}"), vec![])
            .await?;
        let data = resp.get("data").cloned().unwrap_or(resp);
        let last = parse_num(&data, "close").unwrap_or(0.0);
        let bid = parse_num(&data, "bestBid");
        let ask = parse_num(&data, "bestAsk");
        if bid.is_none() && ask.is_none() && last == 0.0 {
            return Err(ExchangeError::MissingPrices);
        }
        Ok(MidPrice::compute(bid, ask, last, chrono::Utc::now().timestamp_millis()))
    }

    async fn get_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let resp = self.client.signed_post("/api/spot/accountList", serde_json::json!({})).await?;
        let rows = resp.get("data").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|b| {
                Some(Balance {
                    asset: parse_str(b, "currency")?.to_string(),
                    free: parse_num(b, "available").unwrap_or(0.0),
                    locked: parse_num(b, "frozen").unwrap_or(0.0),
                })
            })
            .collect())
    }

    async fn get_open_orders(&self, symbol: &CanonicalSymbol) -> Result<Vec<Order>, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let body = serde_json::json!({
            "symbol": venue_symbol,
            "startTime": open_orders_window_start_ms(timestamp_ms()),
        });
        let resp = self.client.signed_post("/api/trade/order/active", body).await?;
        let rows = resp.get("data").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|o| {
                Some(Order {
                    id: parse_str(o, "ordId")
                        .map(str::to_string)
                        .or_else(|| o.get("ordId").map(|v| v.to_string()))?,
                    symbol: symbol.clone(),
                    side: if parse_str(o, "side") == Some("SELL") { Side::Sell } else { Side::Buy },
                    price: parse_num(o, "ordPrice").unwrap_or(0.0),
                    qty: parse_num(o, "ordQty").unwrap_or(0.0),
                    status: OrderStatus::Open,
                    client_order_id: parse_str(o, "clOrdId").map(str::to_string),
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
            "symbol": venue_symbol,
            "side": match quote.side { Side::Buy => "BUY", Side::Sell => "SELL" },
            "ordType": match quote.kind { OrderType::Limit => "LIMIT", OrderType::Market => "MARKET" },
            "ordQty": qty.to_string(),
            "ordPrice": price.map(|p| p.to_string()),
        });
        let resp = self.client.signed_post("/api/trade/order/place", body).await?;
        let data = resp.get("data").cloned().unwrap_or(resp);
        Ok(Order {
            id: data
                .get("ordId")
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
        let body = serde_json::json!({ "symbol": venue_symbol, "ordId": order_id });
        match self.client.signed_post("/api/trade/order/cancel", body).await {
            Ok(_) => Ok(()),
            Err(ExchangeError::BaseUrlOrPathInvalid { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn cancel_all(&self, symbol: Option<&CanonicalSymbol>) -> Result<(), ExchangeError> {
        let mut body = serde_json::json!({});
        if let Some(s) = symbol {
            body["symbol"] = serde_json::Value::String(self.symbols.to_venue(s)?);
        }
        self.client.signed_post("/api/trade/order/cancelAll", body).await?;
        Ok(())
    }

    async fn get_my_trades(
        &self,
        symbol: &CanonicalSymbol,
        query: TradeQuery,
    ) -> Result<Vec<MyTrade>, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let mut body = serde_json::json!({ "symbol": venue_symbol });
        if let Some(limit) = query.limit {
            body["pageSize"] = serde_json::Value::from(limit);
        }
        if let Some(start) = query.start_ms {
            body["startTime"] = serde_json::Value::from(start);
        }
        let resp = self.client.signed_post("/api/trade/match/accountMatches", body).await?;
        let rows = resp.get("data").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let mut trades: Vec<MyTrade> = rows
            .iter()
            .filter_map(|t| {
                let qty = parse_num(t, "matchQty").unwrap_or(0.0);
                let price = parse_num(t, "matchPrice").unwrap_or(0.0);
                Some(MyTrade {
                    id: parse_str(t, "id")?.to_string(),
                    order_id: parse_str(t, "ordId").map(str::to_string),
                    side: if parse_str(t, "side") == Some("SELL") { Side::Sell } else { Side::Buy },
                    price,
                    qty,
                    notional: price * qty,
                    timestamp_ms: t.get("time").and_then(|v| v.as_i64()).unwrap_or(0),
                })
            })
            .collect();
        trades.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        Ok(dedup_trades_by_id(trades))
    }
}
