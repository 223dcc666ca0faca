// =============================================================================
// Error Taxonomy (§7)
// =============================================================================
//
// Infrastructure failures (network, parse, auth/WAF) are caught at subsystem
// boundaries and converted into one of these typed, stable-reason-coded
// variants; only programmer errors (bad arguments) are allowed to panic.
// Call sites that don't need to branch on the variant convert to
// `anyhow::Error` via `?` the same way the teacher's `reqwest`/`serde_json`
// call sites do with `.context(...)`.
// =============================================================================

use thiserror::Error;

/// Errors raised by the exchange gateway (C1-C4).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("canonical symbol missing '/' delimiter: {0}")]
    MalformedCanonicalSymbol(String),

    #[error("venue rejected pair: {0}")]
    VenueRejectedPair(String),

    #[error("qty {qty} < minQty {min_qty}")]
    QtyBelowMinimum { qty: f64, min_qty: f64 },

    #[error("notional {notional} < minNotional {min_notional}")]
    NotionalBelowMinimum { notional: f64, min_notional: f64 },

    #[error("unsupported order type for venue: {0}")]
    UnsupportedOrderType(String),

    #[error("{venue}_auth_failed")]
    AuthFailed { venue: String },

    #[error("{venue}_ip_not_whitelisted_or_waf_block")]
    WafBlock { venue: String },

    #[error("{venue}_base_url_or_path_invalid")]
    BaseUrlOrPathInvalid { venue: String },

    #[error("{venue}_venue_unavailable: {detail}")]
    VenueUnavailable { venue: String, detail: String },

    #[error("missing bid/ask/last prices")]
    MissingPrices,
}

impl ExchangeError {
    /// Stable machine-readable code, as named throughout §7 (e.g.
    /// `bitget_auth_failed`).
    pub fn reason_code(&self) -> String {
        match self {
            ExchangeError::MalformedCanonicalSymbol(_) => "malformed_canonical_symbol".into(),
            ExchangeError::VenueRejectedPair(_) => "venue_rejected_pair".into(),
            ExchangeError::QtyBelowMinimum { .. } => "qty_below_minimum".into(),
            ExchangeError::NotionalBelowMinimum { .. } => "notional_below_minimum".into(),
            ExchangeError::UnsupportedOrderType(_) => "unsupported_type".into(),
            ExchangeError::AuthFailed { venue } => format!("{venue}_auth_failed"),
            ExchangeError::WafBlock { venue } => {
                format!("{venue}_ip_not_whitelisted_or_waf_block")
            }
            ExchangeError::BaseUrlOrPathInvalid { venue } => {
                format!("{venue}_base_url_or_path_invalid")
            }
            ExchangeError::VenueUnavailable { venue, .. } => format!("{venue}_venue_unavailable"),
            ExchangeError::MissingPrices => "missing_prices".into(),
        }
    }

    /// `true` when the failure is a non-retriable domain rejection (as
    /// opposed to a transient network condition already exhausted by C3's
    /// retry policy).
    pub fn is_domain_rejection(&self) -> bool {
        matches!(
            self,
            ExchangeError::QtyBelowMinimum { .. }
                | ExchangeError::NotionalBelowMinimum { .. }
                | ExchangeError::UnsupportedOrderType(_)
                | ExchangeError::MalformedCanonicalSymbol(_)
                | ExchangeError::VenueRejectedPair(_)
        )
    }
}

/// License-gate decisions (§4.15); not all variants are "errors" in the
/// panicking sense — they are returned as values, never propagated as
/// failures (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseDecision {
    EnforcementOff,
    MaxBotsTotalExceeded,
    MaxRunningBotsExceeded,
    ExchangeNotAllowed,
    LicenseServerUnreachable,
    Ok,
}

impl std::fmt::Display for LicenseDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseDecision::EnforcementOff => "enforcement_off",
            LicenseDecision::MaxBotsTotalExceeded => "max_bots_total_exceeded",
            LicenseDecision::MaxRunningBotsExceeded => "max_running_bots_exceeded",
            LicenseDecision::ExchangeNotAllowed => "exchange_not_allowed",
            LicenseDecision::LicenseServerUnreachable => "license_server_unreachable",
            LicenseDecision::Ok => "ok",
        };
        write!(f, "{s}")
    }
}

/// Composite-graph validation errors (§4.11 step 2).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("graph has no nodes")]
    Empty,
    #[error("node count {0} exceeds limit of 30")]
    TooManyNodes(usize),
    #[error("edge count {0} exceeds limit of 120")]
    TooManyEdges(usize),
    #[error("duplicate node id: {0}")]
    DuplicateId(String),
    #[error("self loop on node: {0}")]
    SelfLoop(String),
    #[error("edge references unknown node: {0}")]
    UnknownRef(String),
    #[error("if_confidence_gte edge on {0} is missing a numeric threshold")]
    MissingConfidenceThreshold(String),
    #[error("graph contains a cycle")]
    Cyclic,
    #[error("node {0} references unresolvable strategy ref_id: {1}")]
    UnresolvedNodeRef(String, String),
}
