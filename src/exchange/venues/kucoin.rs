// =============================================================================
// KuCoin Adapter (C4) — HMAC-SHA256 base64, timestamp+method+path+body,
// passphrase itself HMAC-signed (KC-API-KEY-VERSION 2)
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
use crate::exchange::signing::{timestamp_ms, PreHashStyle, RequestSigner, SignAlgo, VenueSignerSpec};
use crate::exchange::symbol::{CanonicalSymbol, KucoinAdapter as KucoinSymbols, VenueSymbolAdapter};

pub struct KucoinAdapter {
    client: SignedHttpClient,
    symbols: KucoinSymbols,
}

impl KucoinAdapter {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: &str,
        min_gap_ms: u64,
    ) -> Self {
        let secret = secret.into();
        // KuCoin signs the passphrase itself with the same HMAC key (API v2).
        let passphrase_signer = RequestSigner::new(
            VenueSignerSpec {
                venue: "kucoin",
                algo: SignAlgo::HmacSha256Base64,
                style: PreHashStyle::QueryStringWithTimestamp,
            },
            secret.clone(),
        );
        let signed_passphrase = passphrase_signer.sign(passphrase);
        let signed_passphrase: &'static str = Box::leak(signed_passphrase.into_boxed_str());

        Self {
            client: SignedHttpClient::new(
                "kucoin",
                "https://api.kucoin.com",
                api_key,
                secret,
                VenueSignerSpec {
                    venue: "kucoin",
                    algo: SignAlgo::HmacSha256Base64,
                    style: PreHashStyle::TimestampMethodPathQueryBody,
                },
                vec![
                    api_key_header("KC-API-KEY"),
                    signature_header("KC-API-SIGN"),
                    timestamp_header("KC-API-TIMESTAMP"),
                    literal_header("KC-API-PASSPHRASE", signed_passphrase),
                    literal_header("KC-API-KEY-VERSION", "2"),
                ],
                min_gap_ms,
            ),
            symbols: KucoinSymbols,
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
impl ExchangeAdapter for KucoinAdapter {
    fn venue(&self) -> &'static str {
        "kucoin"
    }

    async fn get_ticker(&self, symbol: &CanonicalSymbol) -> Result<MidPrice, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let resp = self
            .client
            .signed_get(
                "/api/v1/market/orderbook/level1",
                vec![("symbol".into(), venue_symbol)],
            )
            .await?;
        let data = resp.get("data").cloned().unwrap_or(resp);
        let last = parse_num(&data, "price").unwrap_or(0.0);
        let bid = parse_num(&data, "bestBid");
        let ask = parse_num(&data, "bestAsk");
        if bid.is_none() && ask.is_none() && last == 0.0 {
            return Err(ExchangeError::MissingPrices);
        }
        Ok(MidPrice::compute(bid, ask, last, chrono::Utc::now().timestamp_millis()))
    }

    async fn get_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let resp = self
            .client
            .signed_get("/api/v1/accounts", vec![("type".into(), "trade".into())])
            .await?;
        let rows = resp.get("data").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|b| {
                Some(Balance {
                    asset: parse_str(b, "currency")?.to_string(),
                    free: parse_num(b, "available").unwrap_or(0.0),
                    locked: parse_num(b, "holds").unwrap_or(0.0),
                })
            })
            .collect())
    }

    async fn get_open_orders(&self, symbol: &CanonicalSymbol) -> Result<Vec<Order>, ExchangeError> {
        let venue_symbol = self.symbols.to_venue(symbol)?;
        let resp = self
            .client
            .signed_get(
                "/api/v1/orders",
                vec![
                    ("symbol".into(), venue_symbol),
                    ("status".into(), "active".into()),
                    ("startAt".into(), open_orders_window_start_ms(timestamp_ms()).to_string()),
                ],
            )
            .await?;
        let rows = resp
            .get("data")
            .and_then(|v| v.get("items"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|o| {
                Some(Order {
                    id: parse_str(o, "id")?.to_string(),
                    symbol: symbol.clone(),
                    side: if parse_str(o, "side") == Some("sell") { Side::Sell } else { Side::Buy },
                    price: parse_num(o, "price").unwrap_or(0.0),
                    qty: parse_num(o, "size").unwrap_or(0.0),
                    status: OrderStatus::Open,
                    client_order_id: parse_str(o, "clientOid").map(str::to_string),
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
        let client_oid = quote
            .client_order_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let body = serde_json::json!({
            "clientOid": client_oid,
            "symbol": venue_symbol,
            "side": match quote.side { Side::Buy => "buy", Side::Sell => "sell" },
            "type": match quote.kind { OrderType::Limit => "limit", OrderType::Market => "market" },
            "size": qty.to_string(),
            "price": price.map(|p| p.to_string()),
        });
        let resp = self.client.signed_post("/api/v1/orders", body).await?;
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
            client_order_id: Some(client_oid),
        })
    }

    async fn cancel_order(&self, _symbol: &CanonicalSymbol, order_id: &str) -> Result<(), ExchangeError> {
        match self
            .client
            .signed_post(&format!("/api/v1/orders/{order_id}"), serde_json::json!({}))
            .await
        {
            Ok(_) => Ok(()),
            Err(ExchangeError::BaseUrlOrPathInvalid { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn cancel_all(&self, symbol: Option<&CanonicalSymbol>) -> Result<(), ExchangeError> {
        let mut query = vec![];
        if let Some(s) = symbol {
            query.push(("symbol".to_string(), self.symbols.to_venue(s)?));
        }
        self.client.signed_get("/api/v1/orders", query).await?;
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
            params.push(("pageSize".to_string(), limit.to_string()));
        }
        if let Some(start) = query.start_ms {
            params.push(("startAt".to_string(), start.to_string()));
        }
        let resp = self.client.signed_get("/api/v1/fills", params).await?;
        let rows = resp
            .get("data")
            .and_then(|v| v.get("items"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let mut trades: Vec<MyTrade> = rows
            .iter()
            .filter_map(|t| {
                let qty = parse_num(t, "size").unwrap_or(0.0);
                let notional = parse_num(t, "funds").unwrap_or(0.0);
                let price = parse_num(t, "price")
                    .or_else(|| MyTrade::derive_price_from_notional(notional, qty))
                    .unwrap_or(0.0);
                Some(MyTrade {
                    id: parse_str(t, "tradeId")?.to_string(),
                    order_id: parse_str(t, "orderId").map(str::to_string),
                    side: if parse_str(t, "side") == Some("sell") { Side::Sell } else { Side::Buy },
                    price,
                    qty,
                    notional,
                    timestamp_ms: t.get("createdAt").and_then(|v| v.as_i64()).unwrap_or(0),
                })
            })
            .collect();
        trades.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        Ok(dedup_trades_by_id(trades))
    }
}
