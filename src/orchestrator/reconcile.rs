// =============================================================================
// Open-Order Reconciliation (C13, §5 cancellation semantics)
// =============================================================================
//
// On pause/stop, in-flight quote placements must not be orphaned: the next
// tick reconciles last-known intent against `getOpenOrders`. Directly
// generalizes the teacher's `reconcile.rs` "refresh balances against the
// exchange" loop pattern to "reconcile open orders against last-known
// intent".
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;
use crate::exchange::adapter::{ExchangeAdapter, OrderStatus};
use crate::exchange::CanonicalSymbol;

/// What the bot believed it had in flight before the pause/stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRecord {
    pub client_order_id: String,
    pub symbol: CanonicalSymbol,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReconcileAction {
    /// Venue confirms the order is live; intent was not orphaned.
    Confirmed { order_id: String },
    /// No matching open order found; intent never landed or already
    /// terminated venue-side. Not treated as an error (§4.4 `not_found`
    /// tolerance).
    NotFound { client_order_id: String },
}

/// Fetches current open orders for `symbol` and matches them against
/// `last_known_intent` by client order id.
pub async fn reconcile_open_orders(
    adapter: &dyn ExchangeAdapter,
    symbol: &CanonicalSymbol,
    last_known_intent: &[IntentRecord],
) -> Vec<ReconcileAction> {
    let open_orders = match adapter.get_open_orders(symbol).await {
        Ok(orders) => orders,
        Err(_e) => return vec![],
    };

    last_known_intent
        .iter()
        .map(|intent| {
            let matched = open_orders.iter().find(|o| {
                o.client_order_id.as_deref() == Some(intent.client_order_id.as_str())
                    && o.status == OrderStatus::Open
            });
            match matched {
                Some(order) => ReconcileAction::Confirmed { order_id: order.id.clone() },
                None => ReconcileAction::NotFound { client_order_id: intent.client_order_id.clone() },
            }
        })
        .collect()
}

/// Non-retriable domain rejections (§7) surface as a pause reason rather
/// than a bubbled error.
pub fn pause_reason_for_domain_error(err: &ExchangeError) -> Option<String> {
    if err.is_domain_rejection() {
        Some(err.reason_code())
    } else {
        None
    }
}
