// =============================================================================
// Signed HTTP Client Core — Retry Policy (C3)
// =============================================================================
//
// Shared retry/backoff wrapper around `reqwest`. A venue adapter builds its
// signed request, then calls `dispatch_with_retry` with a closure that
// performs one attempt; this module owns the retry/backoff/error-mapping
// policy so every venue gets identical resilience without re-deriving it.
// Grounded on the teacher's `reqwest::Client` + `.context(...)` idiom in
// `binance/client.rs`, generalized from "no retry" to the full §4.3 policy.
// =============================================================================

use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use tracing::warn;

use crate::error::ExchangeError;
use crate::exchange::signing::is_waf_blocked_body;

/// Up to 2 retries on 429/5xx (§4.3).
pub const MAX_RETRIES: u32 = 2;

/// `min(30s, 1000 * 2^attempt)` with +-20% jitter (§4.3).
pub fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 1000u64.saturating_mul(1u64 << attempt.min(10));
    let capped_ms = base_ms.min(30_000);
    let mut rng = rand::thread_rng();
    let jitter = rng.gen_range(-0.2..=0.2);
    let jittered = (capped_ms as f64) * (1.0 + jitter);
    Duration::from_millis(jittered.max(0.0) as u64)
}

/// Outcome of a single raw HTTP attempt, before retry-policy interpretation.
pub struct RawAttempt {
    pub status: StatusCode,
    pub body: String,
}

/// Classify one attempt's outcome per §4.3. `Retry` means the caller should
/// sleep `backoff_delay(attempt)` and try again (if attempts remain);
/// `Fatal` is a terminal, non-retriable error; `Ok` means treat `body` as a
/// successful JSON payload.
pub enum AttemptOutcome {
    Ok(String),
    Retry,
    Fatal(ExchangeError),
}

pub fn classify_attempt(venue: &'static str, attempt: &RawAttempt) -> AttemptOutcome {
    if is_waf_blocked_body(&attempt.body) {
        return AttemptOutcome::Fatal(ExchangeError::WafBlock { venue: venue.to_string() });
    }
    match attempt.status {
        StatusCode::NOT_FOUND => {
            AttemptOutcome::Fatal(ExchangeError::BaseUrlOrPathInvalid { venue: venue.to_string() })
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AttemptOutcome::Fatal(ExchangeError::AuthFailed { venue: venue.to_string() })
        }
        StatusCode::TOO_MANY_REQUESTS => AttemptOutcome::Retry,
        s if s.is_server_error() => AttemptOutcome::Retry,
        s if s.is_success() => AttemptOutcome::Ok(attempt.body.clone()),
        s => AttemptOutcome::Fatal(ExchangeError::VenueUnavailable {
            venue: venue.to_string(),
            detail: format!("unexpected status {s}"),
        }),
    }
}

/// Run `attempt_fn` up to `MAX_RETRIES + 1` times, sleeping per
/// `backoff_delay` between retriable outcomes. `attempt_fn` performs one
/// network round-trip and returns a [`RawAttempt`] (never an `Err` for
/// HTTP-level failures — only for true transport failures, which are
/// likewise retried up to the cap).
pub async fn dispatch_with_retry<F, Fut>(
    venue: &'static str,
    mut attempt_fn: F,
) -> Result<String, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<RawAttempt, ExchangeError>>,
{
    let mut last_retriable: Option<ExchangeError> = None;
    for attempt in 0..=MAX_RETRIES {
        let raw = match attempt_fn().await {
            Ok(raw) => raw,
            Err(e) => {
                if attempt < MAX_RETRIES {
                    warn!(venue, attempt, error = %e, "transport error, retrying");
                    last_retriable = Some(e);
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    continue;
                }
                return Err(e);
            }
        };

        match classify_attempt(venue, &raw) {
            AttemptOutcome::Ok(body) => return Ok(body),
            AttemptOutcome::Fatal(e) => return Err(e),
            AttemptOutcome::Retry => {
                if attempt < MAX_RETRIES {
                    warn!(venue, attempt, status = %raw.status, "retriable status, backing off");
                    last_retriable = Some(ExchangeError::VenueUnavailable {
                        venue: venue.to_string(),
                        detail: format!("status {}", raw.status),
                    });
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
    }
    Err(last_retriable.unwrap_or(ExchangeError::VenueUnavailable {
        venue: venue.to_string(),
        detail: "retries exhausted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped_at_30s_before_jitter_range() {
        let d = backoff_delay(10);
        // 1000*2^10 = 1,024,000ms, capped to 30,000ms, +-20% jitter.
        assert!(d.as_millis() <= 36_000);
    }

    #[test]
    fn classify_attempt_maps_status_codes() {
        let not_found = RawAttempt {
            status: StatusCode::NOT_FOUND,
            body: "{}".into(),
        };
        assert!(matches!(
            classify_attempt("bitget", &not_found),
            AttemptOutcome::Fatal(ExchangeError::BaseUrlOrPathInvalid { .. })
        ));

        let unauthorized = RawAttempt {
            status: StatusCode::UNAUTHORIZED,
            body: "{}".into(),
        };
        assert!(matches!(
            classify_attempt("bitget", &unauthorized),
            AttemptOutcome::Fatal(ExchangeError::AuthFailed { .. })
        ));

        let rate_limited = RawAttempt {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: "{}".into(),
        };
        assert!(matches!(
            classify_attempt("bitget", &rate_limited),
            AttemptOutcome::Retry
        ));

        let waf = RawAttempt {
            status: StatusCode::OK,
            body: "<html>Just a moment...</html>".into(),
        };
        assert!(matches!(
            classify_attempt("bitget", &waf),
            AttemptOutcome::Fatal(ExchangeError::WafBlock { .. })
        ));
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = AtomicU32::new(0);
        let result = dispatch_with_retry("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    Ok(RawAttempt {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        body: "err".into(),
                    })
                } else {
                    Ok(RawAttempt {
                        status: StatusCode::OK,
                        body: "{\"ok\":true}".into(),
                    })
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "{\"ok\":true}");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_outcome_short_circuits_retries() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = AtomicU32::new(0);
        let result = dispatch_with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(RawAttempt {
                    status: StatusCode::NOT_FOUND,
                    body: "err".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
