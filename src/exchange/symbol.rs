// =============================================================================
// Symbol Adapter Registry (C1)
// =============================================================================
//
// Canonical symbols are always `BASE/QUOTE` uppercase. Each venue speaks a
// different wire dialect; `VenueSymbolAdapter` translates both ways. The
// contract only ever fails when the canonical form lacks the `/` delimiter,
// or (rarely) when a venue actively rejects the pair.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;

/// Known quote assets tried in order by the Pionex suffix-split fallback
/// when a venue string lacks the `_` delimiter.
const KNOWN_QUOTES: &[&str] = &["USDT", "USDC", "BUSD", "BTC", "ETH"];

/// `BASE/QUOTE`, uppercase, venue-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalSymbol(String);

impl CanonicalSymbol {
    pub fn parse(raw: &str) -> Result<Self, ExchangeError> {
        let upper = raw.to_ascii_uppercase();
        if !upper.contains('/') {
            return Err(ExchangeError::MalformedCanonicalSymbol(raw.to_string()));
        }
        Ok(CanonicalSymbol(upper))
    }

    pub fn base_quote(&self) -> (&str, &str) {
        let mut parts = self.0.splitn(2, '/');
        (parts.next().unwrap_or(""), parts.next().unwrap_or(""))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Translates canonical symbols to/from one venue's wire dialect.
pub trait VenueSymbolAdapter: Send + Sync {
    fn venue(&self) -> &'static str;
    fn to_venue(&self, symbol: &CanonicalSymbol) -> Result<String, ExchangeError>;
    fn from_venue(&self, venue_symbol: &str) -> Result<CanonicalSymbol, ExchangeError>;
}

fn join_no_delim(base: &str, quote: &str) -> String {
    format!("{base}{quote}")
}

macro_rules! delimited_adapter {
    ($name:ident, $venue:literal, $delim:literal) => {
        pub struct $name;
        impl VenueSymbolAdapter for $name {
            fn venue(&self) -> &'static str {
                $venue
            }
            fn to_venue(&self, symbol: &CanonicalSymbol) -> Result<String, ExchangeError> {
                let (base, quote) = symbol.base_quote();
                Ok(format!("{base}{}{quote}", $delim))
            }
            fn from_venue(&self, venue_symbol: &str) -> Result<CanonicalSymbol, ExchangeError> {
                let upper = venue_symbol.to_ascii_uppercase();
                match upper.split_once($delim) {
                    Some((b, q)) if !b.is_empty() && !q.is_empty() => {
                        CanonicalSymbol::parse(&format!("{b}/{q}"))
                    }
                    _ => Err(ExchangeError::VenueRejectedPair(venue_symbol.to_string())),
                }
            }
        }
    };
}

delimited_adapter!(BitmartAdapter, "bitmart", "_");
delimited_adapter!(MexcAdapter, "mexc", "_");
delimited_adapter!(P2bAdapter, "p2b", "_");
delimited_adapter!(KucoinAdapter, "kucoin", "-");

macro_rules! concatenated_adapter {
    ($name:ident, $venue:literal) => {
        pub struct $name;
        impl VenueSymbolAdapter for $name {
            fn venue(&self) -> &'static str {
                $venue
            }
            fn to_venue(&self, symbol: &CanonicalSymbol) -> Result<String, ExchangeError> {
                let (base, quote) = symbol.base_quote();
                Ok(join_no_delim(base, quote))
            }
            fn from_venue(&self, venue_symbol: &str) -> Result<CanonicalSymbol, ExchangeError> {
                split_concatenated(venue_symbol)
            }
        }
    };
}

/// Split a delimiter-free venue symbol (`BTCUSDT`) by trying each known
/// quote suffix in order. Shared by Binance/BingX/Coinstore and the Pionex
/// fallback path.
fn split_concatenated(venue_symbol: &str) -> Result<CanonicalSymbol, ExchangeError> {
    let upper = venue_symbol.to_ascii_uppercase();
    for quote in KNOWN_QUOTES {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return CanonicalSymbol::parse(&format!("{base}/{quote}"));
            }
        }
    }
    Err(ExchangeError::VenueRejectedPair(venue_symbol.to_string()))
}

concatenated_adapter!(BinanceAdapter, "binance");
concatenated_adapter!(BingxAdapter, "bingx");
concatenated_adapter!(CoinstoreAdapter, "coinstore");

/// Pionex: `_`-delimited, falling back to suffix-split over known quotes
/// when the venue string has no underscore (§4.1).
pub struct PionexAdapter;
impl VenueSymbolAdapter for PionexAdapter {
    fn venue(&self) -> &'static str {
        "pionex"
    }
    fn to_venue(&self, symbol: &CanonicalSymbol) -> Result<String, ExchangeError> {
        let (base, quote) = symbol.base_quote();
        Ok(format!("{base}_{quote}"))
    }
    fn from_venue(&self, venue_symbol: &str) -> Result<CanonicalSymbol, ExchangeError> {
        let upper = venue_symbol.to_ascii_uppercase();
        if let Some((b, q)) = upper.split_once('_') {
            if !b.is_empty() && !q.is_empty() {
                return CanonicalSymbol::parse(&format!("{b}/{q}"));
            }
        }
        split_concatenated(venue_symbol)
    }
}

/// Bitget speaks the same concatenated dialect as Binance on spot but is
/// listed separately in §4.1's table with no explicit delimiter either;
/// kept as its own type so venue-specific quirks (e.g. a future `_SPBL`
/// suffix) have somewhere to live without disturbing `BinanceAdapter`.
concatenated_adapter!(BitgetAdapter, "bitget");

/// Falls back to identity + `_` normalization for any venue not in the
/// table (§4.1: "Unknown venue -> identity mapping with `_` normalization").
pub struct IdentityAdapter {
    pub venue_name: &'static str,
}
impl VenueSymbolAdapter for IdentityAdapter {
    fn venue(&self) -> &'static str {
        self.venue_name
    }
    fn to_venue(&self, symbol: &CanonicalSymbol) -> Result<String, ExchangeError> {
        let (base, quote) = symbol.base_quote();
        Ok(format!("{base}_{quote}"))
    }
    fn from_venue(&self, venue_symbol: &str) -> Result<CanonicalSymbol, ExchangeError> {
        let upper = venue_symbol.to_ascii_uppercase();
        match upper.split_once('_') {
            Some((b, q)) if !b.is_empty() && !q.is_empty() => {
                CanonicalSymbol::parse(&format!("{b}/{q}"))
            }
            _ => split_concatenated(venue_symbol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(adapter: &dyn VenueSymbolAdapter, canonical: &str) {
        let sym = CanonicalSymbol::parse(canonical).unwrap();
        let venue_str = adapter.to_venue(&sym).unwrap();
        let back = adapter.from_venue(&venue_str).unwrap();
        assert_eq!(back, sym, "round trip failed for {}", adapter.venue());
    }

    #[test]
    fn all_venues_round_trip() {
        let adapters: Vec<Box<dyn VenueSymbolAdapter>> = vec![
            Box::new(BitmartAdapter),
            Box::new(MexcAdapter),
            Box::new(P2bAdapter),
            Box::new(KucoinAdapter),
            Box::new(BinanceAdapter),
            Box::new(BingxAdapter),
            Box::new(CoinstoreAdapter),
            Box::new(PionexAdapter),
            Box::new(BitgetAdapter),
            Box::new(IdentityAdapter { venue_name: "unknown" }),
        ];
        for a in &adapters {
            round_trip(a.as_ref(), "BTC/USDT");
        }
    }

    #[test]
    fn bitmart_example_from_spec_s1() {
        let sym = CanonicalSymbol::parse("BTC/USDT").unwrap();
        let venue_str = BitmartAdapter.to_venue(&sym).unwrap();
        assert_eq!(venue_str, "BTC_USDT");
        assert_eq!(BitmartAdapter.from_venue("BTC_USDT").unwrap(), sym);
    }

    #[test]
    fn malformed_canonical_symbol_rejected() {
        assert!(CanonicalSymbol::parse("BTCUSDT").is_err());
    }

    #[test]
    fn pionex_falls_back_to_suffix_split() {
        let sym = PionexAdapter.from_venue("ETHUSDT").unwrap();
        assert_eq!(sym, CanonicalSymbol::parse("ETH/USDT").unwrap());
    }
}
