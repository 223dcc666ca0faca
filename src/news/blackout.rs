// =============================================================================
// News Blackout Window Evaluation (C14)
// =============================================================================
//
// A symbol is "in blackout" when a high-enough-impact calendar event for a
// relevant currency falls inside `[ts - preMinutes, ts + postMinutes]`.
// `apply_news_risk_to_feature_snapshot` rewrites a feature snapshot's tag
// list idempotently — mirrors the teacher's `smart_filters.rs` tag-rewrite
// helpers that prepend/dedupe a risk tag rather than append blindly.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::news::calendar::{EconomicCalendar, EconomicEvent, Impact};
use crate::signal::types::FeatureSnapshot;

const MAX_TAGS: usize = 5;
const NEWS_RISK_TAG: &str = "news_risk";

/// The `[event.ts - preMinutes, event.ts + postMinutes]` window an active
/// event is currently inside (§3 `BlackoutResult.activeWindow`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub from: i64,
    pub to: i64,
    pub event: EconomicEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackoutResult {
    pub news_risk: bool,
    pub currency: Option<String>,
    pub matched_event: Option<EconomicEvent>,
    pub active_window: Option<ActiveWindow>,
    pub next_event: Option<EconomicEvent>,
    pub summary: Option<String>,
}

/// `newsRisk = true` iff some event with `impact >= impactMin` and a
/// currency relevant to `currencies` has `now` inside
/// `[event.ts - preMinutes, event.ts + postMinutes]` (§4.14) — equivalently,
/// the event's own `ts` falls inside `[now - postMinutes, now + preMinutes]`.
pub fn evaluate_news_blackout(
    calendar: &EconomicCalendar,
    currencies: &[String],
    impact_min: Impact,
    pre_minutes: i64,
    post_minutes: i64,
    now_ts: i64,
) -> BlackoutResult {
    let window_start = now_ts - post_minutes * 60_000;
    let window_end = now_ts + pre_minutes * 60_000;

    let mut matched: Option<EconomicEvent> = None;
    for currency in currencies {
        let events = calendar.list_events(window_start, window_end, Some(currency), Some(impact_min));
        if let Some(event) = events.into_iter().min_by_key(|e| (e.ts - now_ts).abs()) {
            let closer = matched.as_ref().map(|m| (event.ts - now_ts).abs() < (m.ts - now_ts).abs()).unwrap_or(true);
            if closer {
                matched = Some(event);
            }
        }
    }

    match matched {
        Some(event) => {
            let summary = Some(format!("{} ({:?} impact, {})", event.title, event.impact, event.currency));
            let active_window =
                Some(ActiveWindow { from: event.ts - pre_minutes * 60_000, to: event.ts + post_minutes * 60_000, event: event.clone() });
            BlackoutResult {
                news_risk: true,
                currency: Some(event.currency.clone()),
                matched_event: Some(event),
                active_window,
                next_event: None,
                summary,
            }
        }
        None => {
            let next_event = currencies
                .iter()
                .filter_map(|c| calendar.next_event(c, impact_min, now_ts))
                .min_by_key(|e| e.ts);
            BlackoutResult {
                news_risk: false,
                currency: next_event.as_ref().map(|e| e.currency.clone()),
                matched_event: None,
                active_window: None,
                next_event,
                summary: None,
            }
        }
    }
}

/// Idempotently rewrites the `tags` feature path: prepends `news_risk` when
/// active, removes it when not, and caps the tag list at `MAX_TAGS` (§4.14).
/// The blackout summary is attached at the reserved `newsBlackoutSummary`
/// path rather than a dedicated struct field, per `FeatureSnapshot`'s
/// open-bag convention.
pub fn apply_news_risk_to_feature_snapshot(snapshot: &mut FeatureSnapshot, blackout: &BlackoutResult) {
    let mut tags: Vec<String> = snapshot.tags().into_iter().filter(|t| t != NEWS_RISK_TAG).collect();

    if blackout.news_risk {
        tags.insert(0, NEWS_RISK_TAG.to_string());
    }
    tags.truncate(MAX_TAGS);
    snapshot.set_tags(tags);

    match &blackout.summary {
        Some(summary) => snapshot.set("newsBlackoutSummary", summary.clone()),
        None => {
            snapshot.values.remove("newsBlackoutSummary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::calendar::CalendarSource;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct StaticSource(Vec<EconomicEvent>);

    #[async_trait]
    impl CalendarSource for StaticSource {
        async fn fetch_window(&self, _from: DateTime<Utc>, _to: DateTime<Utc>, _currencies: &[String]) -> anyhow::Result<Vec<EconomicEvent>> {
            Ok(self.0.clone())
        }
    }

    fn event(ts: i64, currency: &str, impact: Impact) -> EconomicEvent {
        EconomicEvent {
            source_id: "e1".to_string(),
            ts,
            currency: currency.to_string(),
            country: "US".to_string(),
            title: "NFP".to_string(),
            impact,
            forecast: None,
            previous: None,
            actual: None,
            source: "forexfactory".to_string(),
        }
    }

    async fn calendar_with(events: Vec<EconomicEvent>) -> EconomicCalendar {
        let calendar = EconomicCalendar::new(Box::new(StaticSource(events)));
        calendar.refresh_economic_calendar(&["USD".to_string()], Utc::now()).await.unwrap();
        calendar
    }

    #[tokio::test]
    async fn inside_window_triggers_news_risk() {
        let now = 1_000_000_i64;
        let calendar = calendar_with(vec![event(now + 5 * 60_000, "USD", Impact::High)]).await;
        let result = evaluate_news_blackout(&calendar, &["USD".to_string()], Impact::Medium, 15, 15, now);
        assert!(result.news_risk);
        assert!(result.summary.is_some());
    }

    #[tokio::test]
    async fn outside_window_is_clear() {
        let now = 1_000_000_i64;
        let calendar = calendar_with(vec![event(now + 60 * 60_000, "USD", Impact::High)]).await;
        let result = evaluate_news_blackout(&calendar, &["USD".to_string()], Impact::Medium, 15, 15, now);
        assert!(!result.news_risk);
    }

    #[tokio::test]
    async fn below_impact_min_does_not_trigger() {
        let now = 1_000_000_i64;
        let calendar = calendar_with(vec![event(now, "USD", Impact::Low)]).await;
        let result = evaluate_news_blackout(&calendar, &["USD".to_string()], Impact::High, 15, 15, now);
        assert!(!result.news_risk);
    }

    #[tokio::test]
    async fn active_window_is_centered_on_the_event_not_now() {
        // Event at 12:00Z, pre=30/post=30, evaluated at 11:40Z: window is
        // [11:30, 12:30], event-centered, not [11:10, 12:10] now-centered.
        let event_ts = 1_700_000_000_000_i64;
        let now = event_ts - 20 * 60_000;
        let calendar = calendar_with(vec![event(event_ts, "USD", Impact::High)]).await;
        let result = evaluate_news_blackout(&calendar, &["USD".to_string()], Impact::Medium, 30, 30, now);
        assert!(result.news_risk);
        let window = result.active_window.expect("active window");
        assert_eq!(window.from, event_ts - 30 * 60_000);
        assert_eq!(window.to, event_ts + 30 * 60_000);
        assert_eq!(result.currency.as_deref(), Some("USD"));
    }

    #[tokio::test]
    async fn clear_result_reports_next_event() {
        let now = 1_000_000_i64;
        let calendar = calendar_with(vec![event(now + 60 * 60_000, "USD", Impact::High)]).await;
        let result = evaluate_news_blackout(&calendar, &["USD".to_string()], Impact::Medium, 15, 15, now);
        assert!(!result.news_risk);
        assert!(result.active_window.is_none());
        assert_eq!(result.next_event.map(|e| e.ts), Some(now + 60 * 60_000));
    }

    #[test]
    fn applying_risk_is_idempotent_and_capped() {
        let mut snapshot = FeatureSnapshot::default();
        snapshot.set_tags(vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()]);

        let active = BlackoutResult {
            news_risk: true,
            currency: Some("USD".into()),
            matched_event: None,
            active_window: None,
            next_event: None,
            summary: Some("CPI".into()),
        };
        apply_news_risk_to_feature_snapshot(&mut snapshot, &active);
        assert_eq!(snapshot.tags().len(), MAX_TAGS);
        assert_eq!(snapshot.tags()[0], NEWS_RISK_TAG);

        apply_news_risk_to_feature_snapshot(&mut snapshot, &active);
        assert_eq!(snapshot.tags().iter().filter(|t| *t == NEWS_RISK_TAG).count(), 1);

        let clear =
            BlackoutResult { news_risk: false, currency: None, matched_event: None, active_window: None, next_event: None, summary: None };
        apply_news_risk_to_feature_snapshot(&mut snapshot, &clear);
        assert!(!snapshot.tags().contains(&NEWS_RISK_TAG.to_string()));
        assert!(snapshot.get("newsBlackoutSummary").is_none());
    }
}
