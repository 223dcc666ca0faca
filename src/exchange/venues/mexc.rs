// =============================================================================
// MEXC Adapter (C4) — HMAC-SHA256 hex over query string, Binance-shaped API
// =============================================================================

use async_trait::async_trait;

use crate::error::ExchangeError;
use crate::exchange::adapter::{
    dedup_trades_by_id, open_orders_window_start_ms, Balance, ExchangeAdapter, MidPrice, MyTrade,
    Order, OrderStatus, OrderType, Quote, Side, TradeQuery,
};
use crate::exchange::client::{api_key_header, parse_num, parse_str, SignedHttpClient};
use crate::exchange::precision::{check_mins, normalize_price, normalize_qty, SymbolMeta};
use crate::exchange::signing::{timestamp_ms, PreHashStyle, SignAlgo, VenueSignerSpec};
use crate::exchange::symbol::{CanonicalSymbol, MexcAdapter as MexcSymbols, VenueSymbolAdapter};

const RECV_WINDOW_MS: u64 = 5000;

pub struct MexcAdapter {
    client: SignedHttpClient,
    symbols: MexcSymbols,
}

impl MexcAdapter {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, min_gap_ms: u64) -> Self {
        Self {
            client: SignedHttpClient::new(
                "mexc",
                "https://api.mexc.com",
                api_key,
                secret,
                VenueSignerSpec {
                    venue: "mexc",
                    algo: SignAlgo::HmacSha256Hex,
                    style: PreHashStyle::QueryStringWithTimestamp,
                },
                vec![api_key_header("X-MEXC-APIKEY")],
                min_gap_ms,
            ),
            symbols: MexcSymbols,
        }
    }

    fn recv_window_params(&self) -> Vec<(String, String)> {
        vec![
            ("timestamp".to_string(), timestamp_ms().to_string()),
            ("recvWindow".to_string(), RECV_WINDOW_MS.to_string()),
        ]
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
impl ExchangeAdapter for MexcAdapter {
    fn venue(&self) -> &'static str {
        "mexc"
    }

    async fn get_ticker(&self, symbol: &CanonicalSymbol) -> Result<MidPrice, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let resp = self
            .client
            .signed_get("/api/v3/ticker/bookTicker", vec![("symbol".into(), venue_symbol)])
            .await?;
        let bid = parse_num(&resp, "bidPrice");
        let ask = parse_num(&resp, "askPrice");
        if bid.is_none() && ask.is_none() {
            return Err(ExchangeError::MissingPrices);
        }
        let last = bid.zip(ask).map(|(b, a)| (b + a) / 2.0).unwrap_or(0.0);
        Ok(MidPrice::compute(bid, ask, last, chrono::Utc::now().timestamp_millis()))
    }

    async fn get_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let resp = self.client.signed_get("/api/v3/account", self.recv_window_params()).await?;
        let balances = resp.get("balances").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(balances
            .iter()
            .filter_map(|b| {
                Some(Balance {
                    asset: parse_str(b, "asset")?.to_string(),
                    free: parse_num(b, "free").unwrap_or(0.0),
                    locked: parse_num(b, "locked").unwrap_or(0.0),
                })
            })
            .collect())
    }

    async fn get_open_orders(&self, symbol: &CanonicalSymbol) -> Result<Vec<Order>, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let mut params = self.recv_window_params();
        params.push(("symbol".into(), venue_symbol));
        // Widen to `allOrders` + an explicit startTime so recently placed
        // orders survive `openOrders`' shorter default lookback (§4.4).
        params.push(("startTime".into(), open_orders_window_start_ms(timestamp_ms()).to_string()));
        let resp = self.client.signed_get("/api/v3/allOrders", params).await?;
        let orders = resp.as_array().cloned().unwrap_or_default();
        Ok(orders
            .iter()
            .filter(|o| matches!(parse_str(o, "status"), Some("NEW") | Some("PARTIALLY_FILLED")))
            .filter_map(|o| {
                Some(Order {
                    id: parse_str(o, "orderId")?.to_string(),
                    symbol: symbol.clone(),
                    side: if parse_str(o, "side") == Some("SELL") { Side::Sell } else { Side::Buy },
                    price: parse_num(o, "price").unwrap_or(0.0),
                    qty: parse_num(o, "origQty").unwrap_or(0.0),
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
        let mut params = self.recv_window_params();
        params.push(("symbol".into(), venue_symbol));
        params.push(("side".into(), match quote.side { Side::Buy => "BUY".into(), Side::Sell => "SELL".into() }));
        params.push((
            "type".into(),
            match quote.kind {
                OrderType::Limit => "LIMIT".into(),
                OrderType::Market => "MARKET".into(),
            },
        ));
        if let Some(p) = price {
            params.push(("price".into(), p.to_string()));
        }
        params.push(("quantity".into(), qty.to_string()));
        let resp = self
            .client
            .signed_query_request(reqwest::Method::POST, "/api/v3/order", params)
            .await?;
        Ok(Order {
            id: resp
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
        let mut params = self.recv_window_params();
        params.push(("symbol".into(), venue_symbol));
        params.push(("orderId".into(), order_id.to_string()));
        match self
            .client
            .signed_query_request(reqwest::Method::DELETE, "/api/v3/order", params)
            .await
        {
            Ok(_) => Ok(()),
            Err(ExchangeError::BaseUrlOrPathInvalid { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn cancel_all(&self, symbol: Option<&CanonicalSymbol>) -> Result<(), ExchangeError> {
        let mut params = self.recv_window_params();
        if let Some(s) = symbol {
            params.push(("symbol".into(), self.symbols.to_venue(s)?));
        }
        self.client
            .signed_query_request(reqwest::Method::DELETE, "/api/v3/openOrders", params)
            .await?;
        Ok(())
    }

    async fn get_my_trades(
        &self,
        symbol: &CanonicalSymbol,
        query: TradeQuery,
    ) -> Result<Vec<MyTrade>, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let mut params = self.recv_window_params();
        params.push(("symbol".into(), venue_symbol));
        if let Some(start) = query.start_ms {
            params.push(("startTime".into(), start.to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        let resp = self.client.signed_get("/api/v3/myTrades", params).await?;
        let rows = resp.as_array().cloned().unwrap_or_default();
        let mut trades: Vec<MyTrade> = rows
            .iter()
            .filter_map(|t| {
                let qty = parse_num(t, "qty").unwrap_or(0.0);
                let notional = parse_num(t, "quoteQty").unwrap_or(0.0);
                let price = parse_num(t, "price")
                    .or_else(|| MyTrade::derive_price_from_notional(notional, qty))
                    .unwrap_or(0.0);
                Some(MyTrade {
                    id: t.get("id")?.to_string(),
                    order_id: t.get("orderId").map(|v| v.to_string()),
                    side: if t.get("isBuyer").and_then(|v| v.as_bool()).unwrap_or(true) {
                        Side::Buy
                    } else {
                        Side::Sell
                    },
                    price,
                    qty,
                    notional,
                    timestamp_ms: t.get("time").and_then(|v| v.as_i64()).unwrap_or(0),
                })
            })
            .collect();
        trades.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        Ok(dedup_trades_by_id(trades))
    }
}
