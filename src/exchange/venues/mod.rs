// =============================================================================
// Venue Adapters (C4)
// =============================================================================
//
// One module per exchange in §4.1's table. Each wraps a `SignedHttpClient`
// (C3) + that venue's `VenueSymbolAdapter` (C1) and implements
// `ExchangeAdapter` (§4.4). The teacher's `BinanceClient` is generalized
// into `binance::BinanceAdapter`; the remaining eight follow the same
// shape, varying only base URL, header names, signer spec and endpoint
// paths.
// =============================================================================

pub mod bingx;
pub mod binance;
pub mod bitget;
pub mod bitmart;
pub mod coinstore;
pub mod kucoin;
pub mod mexc;
pub mod p2b;
pub mod pionex;
