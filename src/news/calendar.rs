// =============================================================================
// Economic Calendar Ingestion & Cache (C14)
// =============================================================================
//
// `EconomicCalendar::refresh` pulls a 3-day forward window per configured
// currency set, upserts by `(source, sourceId)`, and maintains day-bucketed
// (6h TTL) and next-event (5min TTL) caches keyed by `(currency, impactMin)`.
// Grounded on the teacher's `FundingRateMonitor` fetch-and-cache shape
// (`reqwest::Client` + `anyhow::Context`).
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub source_id: String,
    pub ts: i64,
    pub currency: String,
    pub country: String,
    pub title: String,
    pub impact: Impact,
    pub forecast: Option<String>,
    pub previous: Option<String>,
    pub actual: Option<String>,
    pub source: String,
}

pub type EconomicEventView = EconomicEvent;

struct DayBucketEntry {
    events: Vec<EconomicEvent>,
    cached_at: Instant,
}

struct NextEventEntry {
    event: Option<EconomicEvent>,
    cached_at: Instant,
}

const DAY_BUCKET_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const NEXT_EVENT_TTL: Duration = Duration::from_secs(5 * 60);
const FORWARD_WINDOW_DAYS: i64 = 3;

/// Fetches, upserts and caches economic-calendar events. The HTTP source is
/// injected as a trait object so tests don't require network access.
#[async_trait::async_trait]
pub trait CalendarSource: Send + Sync {
    async fn fetch_window(&self, from: DateTime<Utc>, to: DateTime<Utc>, currencies: &[String]) -> Result<Vec<EconomicEvent>>;
}

pub struct HttpCalendarSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCalendarSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpCalendarSource {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(12))
                .build()
                .expect("failed to build reqwest client for HttpCalendarSource"),
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl CalendarSource for HttpCalendarSource {
    async fn fetch_window(&self, from: DateTime<Utc>, to: DateTime<Utc>, currencies: &[String]) -> Result<Vec<EconomicEvent>> {
        let url = format!("{}/calendar", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("from", from.to_rfc3339()), ("to", to.to_rfc3339())])
            .query(&[("currencies", currencies.join(","))])
            .send()
            .await
            .context("economic calendar fetch failed")?;
        let events = response
            .json::<Vec<EconomicEvent>>()
            .await
            .context("economic calendar response parse failed")?;
        Ok(events)
    }
}

pub struct EconomicCalendar {
    source: Box<dyn CalendarSource>,
    events: RwLock<HashMap<(String, String), EconomicEvent>>,
    day_buckets: RwLock<HashMap<(String, String), DayBucketEntry>>,
    next_events: RwLock<HashMap<(String, String), NextEventEntry>>,
}

impl EconomicCalendar {
    pub fn new(source: Box<dyn CalendarSource>) -> Self {
        EconomicCalendar {
            source,
            events: RwLock::new(HashMap::new()),
            day_buckets: RwLock::new(HashMap::new()),
            next_events: RwLock::new(HashMap::new()),
        }
    }

    /// §4.14: pulls a 3-day forward window, upserts by `(source,sourceId)`.
    pub async fn refresh_economic_calendar(&self, currencies: &[String], now: DateTime<Utc>) -> Result<usize> {
        let to = now + chrono::Duration::days(FORWARD_WINDOW_DAYS);
        let fetched = self.source.fetch_window(now, to, currencies).await?;
        let mut events = self.events.write();
        for event in &fetched {
            events.insert((event.source.clone(), event.source_id.clone()), event.clone());
        }
        // Invalidate derived caches; they repopulate lazily on next read.
        self.day_buckets.write().clear();
        self.next_events.write().clear();
        Ok(fetched.len())
    }

    /// `listEconomicEvents` surface (§6): filters the upserted store.
    pub fn list_events(
        &self,
        from: i64,
        to: i64,
        currency: Option<&str>,
        impact_min: Option<Impact>,
    ) -> Vec<EconomicEvent> {
        let key = (currency.unwrap_or("*").to_string(), format!("{:?}", impact_min));
        if let Some(cached) = self.day_buckets.read().get(&key) {
            if cached.cached_at.elapsed() < DAY_BUCKET_TTL {
                return cached.events.clone();
            }
        }

        let events = self.events.read();
        let filtered: Vec<EconomicEvent> = events
            .values()
            .filter(|e| e.ts >= from && e.ts <= to)
            .filter(|e| currency.map(|c| e.currency == c).unwrap_or(true))
            .filter(|e| impact_min.map(|min| e.impact >= min).unwrap_or(true))
            .cloned()
            .collect();
        drop(events);

        self.day_buckets.write().insert(
            key,
            DayBucketEntry { events: filtered.clone(), cached_at: Instant::now() },
        );
        filtered
    }

    /// Next upcoming event for `(currency, impactMin)`, 5min TTL.
    pub fn next_event(&self, currency: &str, impact_min: Impact, now_ts: i64) -> Option<EconomicEvent> {
        let key = (currency.to_string(), format!("{impact_min:?}"));
        if let Some(cached) = self.next_events.read().get(&key) {
            if cached.cached_at.elapsed() < NEXT_EVENT_TTL {
                return cached.event.clone();
            }
        }

        let events = self.events.read();
        let next = events
            .values()
            .filter(|e| e.currency == currency && e.impact >= impact_min && e.ts >= now_ts)
            .min_by_key(|e| e.ts)
            .cloned();
        drop(events);

        self.next_events.write().insert(key, NextEventEntry { event: next.clone(), cached_at: Instant::now() });
        next
    }

    pub fn events_for_currency(&self, currency: &str) -> Vec<EconomicEvent> {
        self.events.read().values().filter(|e| e.currency == currency).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource(Vec<EconomicEvent>);

    #[async_trait::async_trait]
    impl CalendarSource for StaticSource {
        async fn fetch_window(&self, _from: DateTime<Utc>, _to: DateTime<Utc>, _currencies: &[String]) -> Result<Vec<EconomicEvent>> {
            Ok(self.0.clone())
        }
    }

    fn event(source_id: &str, ts: i64, currency: &str, impact: Impact) -> EconomicEvent {
        EconomicEvent {
            source_id: source_id.to_string(),
            ts,
            currency: currency.to_string(),
            country: "US".to_string(),
            title: "CPI".to_string(),
            impact,
            forecast: None,
            previous: None,
            actual: None,
            source: "forexfactory".to_string(),
        }
    }

    #[tokio::test]
    async fn refresh_upserts_by_source_and_id() {
        let source = StaticSource(vec![event("e1", 1000, "USD", Impact::High)]);
        let calendar = EconomicCalendar::new(Box::new(source));
        let n = calendar.refresh_economic_calendar(&["USD".to_string()], Utc::now()).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(calendar.events_for_currency("USD").len(), 1);
    }

    #[tokio::test]
    async fn list_events_filters_by_impact_and_currency() {
        let source = StaticSource(vec![
            event("e1", 1000, "USD", Impact::High),
            event("e2", 1000, "EUR", Impact::Low),
        ]);
        let calendar = EconomicCalendar::new(Box::new(source));
        calendar.refresh_economic_calendar(&["USD".to_string(), "EUR".to_string()], Utc::now()).await.unwrap();

        let usd_high = calendar.list_events(0, 2000, Some("USD"), Some(Impact::Medium));
        assert_eq!(usd_high.len(), 1);

        let eur_high = calendar.list_events(0, 2000, Some("EUR"), Some(Impact::Medium));
        assert!(eur_high.is_empty());
    }
}
