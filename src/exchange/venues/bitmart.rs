// =============================================================================
// Bitmart Adapter (C4) — HMAC-SHA256 hex over timestamp+memo+body
// =============================================================================

use async_trait::async_trait;

use crate::error::ExchangeError;
use crate::exchange::adapter::{
    dedup_trades_by_id, open_orders_window_start_ms, Balance, ExchangeAdapter, MidPrice, MyTrade,
    Order, OrderStatus, OrderType, Quote, Side, TradeQuery,
};
use crate::exchange::client::{
    api_key_header, literal_header, parse_num, parse_str, signature_header, timestamp_header,
    SignedHttpClient,
};
use crate::exchange::precision::{check_mins, normalize_price, normalize_qty, SymbolMeta};
use crate::exchange::signing::{timestamp_ms, PreHashStyle, SignAlgo, VenueSignerSpec};
use crate::exchange::symbol::{BitmartAdapter as BitmartSymbols, CanonicalSymbol, VenueSymbolAdapter};

pub struct BitmartAdapter {
    client: SignedHttpClient,
    symbols: BitmartSymbols,
}

impl BitmartAdapter {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        memo: &'static str,
        min_gap_ms: u64,
    ) -> Self {
        Self {
            client: SignedHttpClient::new(
                "bitmart",
                "https://api-cloud.bitmart.com",
                api_key,
                secret,
                VenueSignerSpec {
                    venue: "bitmart",
                    algo: SignAlgo::HmacSha256Hex,
                    style: PreHashStyle::TimestampMethodPathQueryBody,
                },
                vec![
                    api_key_header("X-BM-KEY"),
                    signature_header("X-BM-SIGN"),
                    timestamp_header("X-BM-TIMESTAMP"),
                    literal_header("X-BM-MEMO", memo),
                ],
                min_gap_ms,
            ),
            symbols: BitmartSymbols,
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
impl ExchangeAdapter for BitmartAdapter {
    fn venue(&self) -> &'static str {
        "bitmart"
    }

    async fn get_ticker(&self, symbol: &CanonicalSymbol) -> Result<MidPrice, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let resp = self
            .client
            .signed_get("/spot/quotation/v3/ticker", vec![("symbol".into(), venue_symbol)])
            .await?;
        let last = parse_num(&resp, "last").unwrap_or(0.0);
        let bid = parse_num(&resp, "best_bid");
        let ask = parse_num(&resp, "best_ask");
        if bid.is_none() && ask.is_none() && last == 0.0 {
            return Err(ExchangeError::MissingPrices);
        }
        Ok(MidPrice::compute(bid, ask, last, chrono::Utc::now().timestamp_millis()))
    }

    async fn get_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let resp = self.client.signed_get("/account/v1/wallet", vec![]).await?;
        let wallets = resp.get("wallet").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(wallets
            .iter()
            .filter_map(|w| {
                Some(Balance {
                    asset: parse_str(w, "id")?.to_string(),
                    free: parse_num(w, "available").unwrap_or(0.0),
                    locked: parse_num(w, "frozen").unwrap_or(0.0),
                })
            })
            .collect())
    }

    async fn get_open_orders(&self, symbol: &CanonicalSymbol) -> Result<Vec<Order>, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let resp = self
            .client
            .signed_get(
                "/spot/v4/query/open-orders",
                vec![
                    ("symbol".into(), venue_symbol),
                    ("startTime".into(), open_orders_window_start_ms(timestamp_ms()).to_string()),
                ],
            )
            .await?;
        let rows = resp.as_array().cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|o| {
                Some(Order {
                    id: parse_str(o, "order_id")?.to_string(),
                    symbol: symbol.clone(),
                    side: if parse_str(o, "side") == Some("sell") { Side::Sell } else { Side::Buy },
                    price: parse_num(o, "price").unwrap_or(0.0),
                    qty: parse_num(o, "size").unwrap_or(0.0),
                    status: OrderStatus::Open,
                    client_order_id: parse_str(o, "client_order_id").map(str::to_string),
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
            "side": match quote.side { Side::Buy => "buy", Side::Sell => "sell" },
            "type": match quote.kind { OrderType::Limit => "limit", OrderType::Market => "market" },
            "size": qty.to_string(),
            "price": price.map(|p| p.to_string()),
        });
        let resp = self.client.signed_post("/spot/v2/submit_order", body).await?;
        Ok(Order {
            id: resp
                .get("order_id")
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
        let body = serde_json::json!({ "symbol": venue_symbol, "order_id": order_id });
        match self.client.signed_post("/spot/v3/cancel_order", body).await {
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
        self.client.signed_post("/spot/v1/cancel_orders", body).await?;
        Ok(())
    }

    async fn get_my_trades(
        &self,
        symbol: &CanonicalSymbol,
        query: TradeQuery,
    ) -> Result<Vec<MyTrade>, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let mut params = vec![("symbol".to_string(), venue_symbol)];
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(start) = query.start_ms {
            params.push(("startTime".to_string(), start.to_string()));
        }
        let resp = self.client.signed_get("/spot/v4/query/trades", params).await?;
        let rows = resp.as_array().cloned().unwrap_or_default();
        let mut trades: Vec<MyTrade> = rows
            .iter()
            .filter_map(|t| {
                let qty = parse_num(t, "size").unwrap_or(0.0);
                let notional = parse_num(t, "notional").unwrap_or(0.0);
                let price = parse_num(t, "price")
                    .or_else(|| MyTrade::derive_price_from_notional(notional, qty))
                    .unwrap_or(0.0);
                Some(MyTrade {
                    id: parse_str(t, "trade_id")?.to_string(),
                    order_id: parse_str(t, "order_id").map(str::to_string),
                    side: if parse_str(t, "side") == Some("sell") { Side::Sell } else { Side::Buy },
                    price,
                    qty,
                    notional,
                    timestamp_ms: t.get("create_time").and_then(|v| v.as_i64()).unwrap_or(0),
                })
            })
            .collect();
        trades.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        Ok(dedup_trades_by_id(trades))
    }
}
