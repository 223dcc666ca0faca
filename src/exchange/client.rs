// =============================================================================
// Signed HTTP Client Core — Shared Plumbing (C3)
// =============================================================================
//
// One `SignedHttpClient` per venue ties together the request signer (C3
// signing.rs), the FIFO throttle (C3 queue.rs), the retry policy (C3
// http.rs) and the catalog cache (C3 catalog.rs). Each venue adapter
// (`exchange::venues::*`) holds one of these and supplies only its base
// URL, header names and pre-hash style — generalizing the teacher's single
// `BinanceClient` (which inlined all four concerns) into reusable plumbing
// plus a thin per-venue shell.
// =============================================================================

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, instrument};

use crate::error::ExchangeError;
use crate::exchange::catalog::CatalogCache;
use crate::exchange::http::{dispatch_with_retry, RawAttempt};
use crate::exchange::queue::VenueThrottle;
use crate::exchange::signing::{timestamp_ms, RequestSigner, VenueSignerSpec};

/// Declarative header injection: header name -> value-producer. `{apikey}`
/// and `{signature}` placeholders are substituted per request.
#[derive(Debug, Clone)]
pub struct HeaderTemplate {
    pub name: &'static str,
    pub value_is_api_key: bool,
    pub value_is_signature: bool,
    pub value_is_timestamp: bool,
    pub literal: Option<&'static str>,
}

pub struct SignedHttpClient {
    pub venue: &'static str,
    base_url: String,
    api_key: String,
    signer: RequestSigner,
    header_templates: Vec<HeaderTemplate>,
    http: reqwest::Client,
    throttle: VenueThrottle,
    pub catalog: CatalogCache,
}

impl SignedHttpClient {
    pub fn new(
        venue: &'static str,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        secret: impl Into<String>,
        signer_spec: VenueSignerSpec,
        header_templates: Vec<HeaderTemplate>,
        min_gap_ms: u64,
    ) -> Self {
        Self {
            venue,
            base_url: base_url.into(),
            api_key: api_key.into(),
            signer: RequestSigner::new(signer_spec, secret),
            header_templates,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(12))
                .build()
                .expect("failed to build reqwest client"),
            throttle: VenueThrottle::new(venue, min_gap_ms),
            catalog: CatalogCache::new(),
        }
    }

    fn build_headers(&self, signature: &str, ts: u64) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for tpl in &self.header_templates {
            let value = if tpl.value_is_api_key {
                self.api_key.clone()
            } else if tpl.value_is_signature {
                signature.to_string()
            } else if tpl.value_is_timestamp {
                ts.to_string()
            } else {
                tpl.literal.unwrap_or("").to_string()
            };
            if let (Ok(name), Ok(val)) = (
                HeaderName::from_bytes(tpl.name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.insert(name, val);
            }
        }
        headers
    }

    /// Perform one signed GET, serialized through this venue's throttle and
    /// retried per C3 policy. `query_pairs` is assembled into a sorted,
    /// canonical query string before signing.
    pub async fn signed_get(
        &self,
        path: &str,
        query_pairs: Vec<(String, String)>,
    ) -> Result<serde_json::Value, ExchangeError> {
        self.signed_query_request(reqwest::Method::GET, path, query_pairs).await
    }

    /// Perform one signed request whose parameters travel on the query
    /// string regardless of HTTP method — the convention Binance/MEXC/
    /// Bitmart/BingX-family venues use even for order placement and
    /// cancellation (§4.3's pre-hash is the query string itself for these).
    #[instrument(skip(self, query_pairs), fields(venue = self.venue, path = path))]
    pub async fn signed_query_request(
        &self,
        method: reqwest::Method,
        path: &str,
        mut query_pairs: Vec<(String, String)>,
    ) -> Result<serde_json::Value, ExchangeError> {
        self.throttle.acquire().await;

        query_pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let query = query_pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let venue = self.venue;
        let result = dispatch_with_retry(venue, || {
            let ts = timestamp_ms();
            let sig = self.signer.sign_request(ts, method.as_str(), path, &query, "");
            let headers = self.build_headers(&sig, ts);
            let url = if query.is_empty() {
                format!("{}{}", self.base_url, path)
            } else {
                format!("{}{}?{}", self.base_url, path, query)
            };
            let http = self.http.clone();
            let method = method.clone();
            async move {
                let resp = http
                    .request(method, &url)
                    .headers(headers)
                    .send()
                    .await
                    .map_err(|e| ExchangeError::VenueUnavailable {
                        venue: venue.to_string(),
                        detail: e.to_string(),
                    })?;
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                Ok(RawAttempt { status, body })
            }
        })
        .await?;

        debug!(venue, "signed request completed");
        serde_json::from_str(&result).map_err(|e| ExchangeError::VenueUnavailable {
            venue: venue.to_string(),
            detail: format!("non-JSON response: {e}"),
        })
    }

    /// Perform one signed POST with a JSON body.
    #[instrument(skip(self, body), fields(venue = self.venue, path = path))]
    pub async fn signed_post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ExchangeError> {
        self.throttle.acquire().await;
        let body_str = body.to_string();
        let venue = self.venue;

        let result = dispatch_with_retry(venue, || {
            let ts = timestamp_ms();
            let sig = self.signer.sign_request(ts, "POST", path, "", &body_str);
            let headers = self.build_headers(&sig, ts);
            let url = format!("{}{}", self.base_url, path);
            let http = self.http.clone();
            let body_str = body_str.clone();
            async move {
                let resp = http
                    .post(&url)
                    .headers(headers)
                    .header("Content-Type", "application/json")
                    .body(body_str)
                    .send()
                    .await
                    .map_err(|e| ExchangeError::VenueUnavailable {
                        venue: venue.to_string(),
                        detail: e.to_string(),
                    })?;
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                Ok(RawAttempt { status, body })
            }
        })
        .await?;

        serde_json::from_str(&result).map_err(|e| ExchangeError::VenueUnavailable {
            venue: venue.to_string(),
            detail: format!("non-JSON response: {e}"),
        })
    }
}

/// Convenience builder for the common "single bearer-style header" venues.
pub fn api_key_header(header_name: &'static str) -> HeaderTemplate {
    HeaderTemplate {
        name: header_name,
        value_is_api_key: true,
        value_is_signature: false,
        value_is_timestamp: false,
        literal: None,
    }
}

pub fn signature_header(header_name: &'static str) -> HeaderTemplate {
    HeaderTemplate {
        name: header_name,
        value_is_api_key: false,
        value_is_signature: true,
        value_is_timestamp: false,
        literal: None,
    }
}

pub fn timestamp_header(header_name: &'static str) -> HeaderTemplate {
    HeaderTemplate {
        name: header_name,
        value_is_api_key: false,
        value_is_signature: false,
        value_is_timestamp: true,
        literal: None,
    }
}

pub fn literal_header(header_name: &'static str, value: &'static str) -> HeaderTemplate {
    HeaderTemplate {
        name: header_name,
        value_is_api_key: false,
        value_is_signature: false,
        value_is_timestamp: false,
        literal: Some(value),
    }
}

/// Parse a `serde_json::Value` field as `f64`, accepting both a JSON number
/// and a JSON string (every venue in §4.4 mixes both conventions).
pub fn parse_num(v: &serde_json::Value, field: &str) -> Option<f64> {
    v.get(field).and_then(|x| {
        x.as_f64()
            .or_else(|| x.as_str().and_then(|s| s.parse::<f64>().ok()))
    })
}

pub fn parse_str<'a>(v: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    v.get(field).and_then(|x| x.as_str())
}
