// =============================================================================
// News & Calendar Risk Overlay (C14)
// =============================================================================
//
// `calendar` ingests/caches the economic calendar; `blackout` evaluates a
// symbol's active blackout window and rewrites a feature snapshot's
// `news_risk` tag. Grounded on the teacher's `futures_intel/*` TTL-cached
// external-data-ingestion style (`funding_rate.rs`, `open_interest.rs`).
// =============================================================================

pub mod blackout;
pub mod calendar;

pub use blackout::{apply_news_risk_to_feature_snapshot, evaluate_news_blackout, ActiveWindow, BlackoutResult};
pub use calendar::{EconomicEvent, EconomicEventView, EconomicCalendar, Impact};
