// =============================================================================
// Pionex Adapter (C4) — HMAC-SHA256 hex over query string + body
// =============================================================================

use async_trait::async_trait;

use crate::error::ExchangeError;
use crate::exchange::adapter::{
    dedup_trades_by_id, open_orders_window_start_ms, Balance, ExchangeAdapter, MidPrice, MyTrade,
    Order, OrderStatus, OrderType, Quote, Side, TradeQuery,
};
use crate::exchange::client::{api_key_header, parse_num, parse_str, signature_header, SignedHttpClient};
use crate::exchange::precision::{check_mins, normalize_price, normalize_qty, SymbolMeta};
use crate::exchange::signing::{timestamp_ms, PreHashStyle, SignAlgo, VenueSignerSpec};
use crate::exchange::symbol::{CanonicalSymbol, PionexAdapter as PionexSymbols, VenueSymbolAdapter};

pub struct PionexAdapter {
    client: SignedHttpClient,
    symbols: PionexSymbols,
}

impl PionexAdapter {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, min_gap_ms: u64) -> Self {
        Self {
            client: SignedHttpClient::new(
                "pionex",
                "https://api.pionex.com",
                api_key,
                secret,
                VenueSignerSpec {
                    venue: "pionex",
                    algo: SignAlgo::HmacSha256Hex,
                    style: PreHashStyle::TimestampMethodPathQueryBody,
                },
                vec![api_key_header("PIONEX-KEY"), signature_header("PIONEX-SIGNATURE")],
                min_gap_ms,
            ),
            symbols: PionexSymbols,
        }
    }

    fn timestamp_param(&self) -> Vec<(String, String)> {
        vec![("timestamp".to_string(), timestamp_ms().to_string())]
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
impl ExchangeAdapter for PionexAdapter {
    fn venue(&self) -> &'static str {
        "pionex"
    }

    async fn get_ticker(&self, symbol: &CanonicalSymbol) -> Result<MidPrice, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let resp = self
            .client
            .signed_get("/api/v1/market/tickers", vec![("symbol".into(), venue_symbol)])
            .await?;
        let first = resp
            .get("data")
            .and_then(|v| v.get("tickers"))
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let last = parse_num(&first, "close").unwrap_or(0.0);
        if last == 0.0 {
            return Err(ExchangeError::MissingPrices);
        }
        Ok(MidPrice::compute(None, None, last, chrono::Utc::now().timestamp_millis()))
    }

    async fn get_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let resp = self.client.signed_get("/api/v1/account/balances", self.timestamp_param()).await?;
        let rows = resp
            .get("data")
            .and_then(|v| v.get("balances"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|b| {
                Some(Balance {
                    asset: parse_str(b, "coin")?.to_string(),
                    free: parse_num(b, "free").unwrap_or(0.0),
                    locked: parse_num(b, "frozen").unwrap_or(0.0),
                })
            })
            .collect())
    }

    async fn get_open_orders(&self, symbol: &CanonicalSymbol) -> Result<Vec<Order>, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let mut params = self.timestamp_param();
        params.push(("symbol".into(), venue_symbol));
        params.push(("startTime".into(), open_orders_window_start_ms(timestamp_ms()).to_string()));
        let resp = self.client.signed_get("/api/v1/trade/openOrders", params).await?;
        let rows = resp
            .get("data")
            .and_then(|v| v.get("orders"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|o| {
                Some(Order {
                    id: o.get("orderId").map(|v| v.to_string())?,
                    symbol: symbol.clone(),
                    side: if parse_str(o, "side") == Some("SELL") { Side::Sell } else { Side::Buy },
                    price: parse_num(o, "price").unwrap_or(0.0),
                    qty: parse_num(o, "size").unwrap_or(0.0),
                    status: OrderStatus::Open,
                    client_order_id: parse_str(o, "clientOrderId").map(str::to_string),
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
            "type": match quote.kind { OrderType::Limit => "LIMIT", OrderType::Market => "MARKET" },
            "size": qty.to_string(),
            "price": price.map(|p| p.to_string()),
            "clientOrderId": quote.client_order_id.clone(),
        });
        let resp = self.client.signed_post("/api/v1/trade/order", body).await?;
        let data = resp.get("data").cloned().unwrap_or(resp);
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
        let body = serde_json::json!({ "symbol": venue_symbol, "orderId": order_id });
        match self.client.signed_post("/api/v1/trade/order", body).await {
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
        self.client.signed_post("/api/v1/trade/allOrders", body).await?;
        Ok(())
    }

    async fn get_my_trades(
        &self,
        symbol: &CanonicalSymbol,
        query: TradeQuery,
    ) -> Result<Vec<MyTrade>, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let mut params = self.timestamp_param();
        params.push(("symbol".into(), venue_symbol));
        if let Some(limit) = query.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        if let Some(start) = query.start_ms {
            params.push(("startTime".into(), start.to_string()));
        }
        let resp = self.client.signed_get("/api/v1/trade/fills", params).await?;
        let rows = resp
            .get("data")
            .and_then(|v| v.get("fills"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let mut trades: Vec<MyTrade> = rows
            .iter()
            .filter_map(|t| {
                let qty = parse_num(t, "size").unwrap_or(0.0);
                let price = parse_num(t, "price").unwrap_or(0.0);
                Some(MyTrade {
                    id: t.get("id").map(|v| v.to_string())?,
                    order_id: t.get("orderId").map(|v| v.to_string()),
                    side: if parse_str(t, "side") == Some("SELL") { Side::Sell } else { Side::Buy },
                    price,
                    qty,
                    notional: price * qty,
                    timestamp_ms: t.get("timestamp").and_then(|v| v.as_i64()).unwrap_or(0),
                })
            })
            .collect();
        trades.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        Ok(dedup_trades_by_id(trades))
    }
}
