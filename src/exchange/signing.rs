// =============================================================================
// Per-Venue Request Signer (C3)
// =============================================================================
//
// Every venue signs a deterministic pre-hash string built from
// `timestamp || method || path || canonical-query || body` (§4.3); only the
// exact assembly and the MAC algorithm vary. `SignAlgo` picks the algorithm,
// `PreHashStyle` picks the assembly, and `sign()` does the HMAC + encoding —
// grounded directly on the teacher's `BinanceClient::sign`/`signed_query`
// (`binance/client.rs`), generalized from "always SHA256 hex, always query
// string" to the handful of variants the other eight venues actually use.
// =============================================================================

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use crate::error::ExchangeError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// MAC algorithm a venue signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignAlgo {
    HmacSha256Hex,
    HmacSha256Base64,
    HmacSha512Hex,
}

/// How the pre-hash string is assembled for a given request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreHashStyle {
    /// `timestamp + method + path + query + body` (Bitget/KuCoin/OKX-family).
    TimestampMethodPathQueryBody,
    /// `query-string-only` with `timestamp`/`recvWindow` appended to the
    /// query before signing (Binance/MEXC/Bitmart-family).
    QueryStringWithTimestamp,
}

/// Fixed per-venue signing parameters.
#[derive(Debug, Clone)]
pub struct VenueSignerSpec {
    pub venue: &'static str,
    pub algo: SignAlgo,
    pub style: PreHashStyle,
}

/// Stateless signer bound to one venue's API secret.
pub struct RequestSigner {
    spec: VenueSignerSpec,
    secret: String,
}

impl RequestSigner {
    pub fn new(spec: VenueSignerSpec, secret: impl Into<String>) -> Self {
        Self {
            spec,
            secret: secret.into(),
        }
    }

    pub fn venue(&self) -> &'static str {
        self.spec.venue
    }

    fn mac_hex_sha256(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn mac_base64_sha256(&self, payload: &str) -> String {
        use base64::Engine;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(payload.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    fn mac_hex_sha512(&self, payload: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Sign the assembled pre-hash string with this venue's chosen algorithm.
    pub fn sign(&self, prehash: &str) -> String {
        match self.spec.algo {
            SignAlgo::HmacSha256Hex => self.mac_hex_sha256(prehash),
            SignAlgo::HmacSha256Base64 => self.mac_base64_sha256(prehash),
            SignAlgo::HmacSha512Hex => self.mac_hex_sha512(prehash),
        }
    }

    /// Build the pre-hash string for this venue's style and sign it.
    pub fn sign_request(
        &self,
        timestamp_ms: u64,
        method: &str,
        path: &str,
        query: &str,
        body: &str,
    ) -> String {
        let prehash = match self.spec.style {
            PreHashStyle::TimestampMethodPathQueryBody => {
                let q = if query.is_empty() {
                    String::new()
                } else {
                    format!("?{query}")
                };
                format!("{timestamp_ms}{method}{path}{q}{body}")
            }
            PreHashStyle::QueryStringWithTimestamp => query.to_string(),
        };
        self.sign(&prehash)
    }
}

/// Current UNIX timestamp in milliseconds.
pub fn timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_millis() as u64
}

/// Known allow-listed clientOrderId prefixes (§4.3). Any caller-supplied
/// prefix outside this list falls back to the generic `x-` prefix.
const KNOWN_PREFIXES: &[&str] = &["hl-", "mm-", "bot-", "x-"];

/// Replace `raw` with `prefix + sha256(raw)` truncated to `max_len` when it
/// exceeds the venue's maximum clientOrderId length.
pub fn normalize_client_order_id(raw: &str, max_len: usize, prefix_hint: &str) -> String {
    if raw.len() <= max_len {
        return raw.to_string();
    }
    let prefix = KNOWN_PREFIXES
        .iter()
        .find(|p| prefix_hint.starts_with(**p))
        .copied()
        .unwrap_or("x-");
    let mut hasher = <sha2::Sha256 as sha2::Digest>::new();
    sha2::Digest::update(&mut hasher, raw.as_bytes());
    let digest = hex::encode(sha2::Digest::finalize(hasher));
    let mut out = String::with_capacity(max_len);
    out.push_str(prefix);
    let remaining = max_len.saturating_sub(prefix.len());
    out.push_str(&digest[..remaining.min(digest.len())]);
    out
}

/// Detects the handful of body shapes that mean "WAF / bot-challenge page",
/// not valid JSON (§4.3): Cloudflare interstitials and similar.
pub fn is_waf_blocked_body(body: &str) -> bool {
    body.contains("Just a moment") || body.contains("cf-browser-verification")
}

/// Validates that a secret string is non-empty before use; malformed
/// credentials are a programmer/config error, not a retriable network one.
pub fn require_non_empty(value: &str, what: &'static str) -> Result<(), ExchangeError> {
    if value.trim().is_empty() {
        return Err(ExchangeError::AuthFailed { venue: what.to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_base64_signers_differ_in_encoding_only() {
        let hex_signer = RequestSigner::new(
            VenueSignerSpec {
                venue: "test",
                algo: SignAlgo::HmacSha256Hex,
                style: PreHashStyle::QueryStringWithTimestamp,
            },
            "secret",
        );
        let b64_signer = RequestSigner::new(
            VenueSignerSpec {
                venue: "test",
                algo: SignAlgo::HmacSha256Base64,
                style: PreHashStyle::QueryStringWithTimestamp,
            },
            "secret",
        );
        let a = hex_signer.sign("payload");
        let b = b64_signer.sign("payload");
        assert_ne!(a, b);
        assert!(hex::decode(&a).is_ok());
    }

    #[test]
    fn client_order_id_truncated_when_too_long() {
        let raw = "a".repeat(64);
        let out = normalize_client_order_id(&raw, 32, "bot-");
        assert_eq!(out.len(), 32);
        assert!(out.starts_with("bot-"));
    }

    #[test]
    fn client_order_id_passthrough_when_short_enough() {
        let out = normalize_client_order_id("my-order-1", 32, "bot-");
        assert_eq!(out, "my-order-1");
    }

    #[test]
    fn waf_block_detection() {
        assert!(is_waf_blocked_body("<html>Just a moment...</html>"));
        assert!(is_waf_blocked_body("cf-browser-verification required"));
        assert!(!is_waf_blocked_body("{\"ok\":true}"));
    }
}
