// =============================================================================
// Bot Runtime Orchestrator (C13)
// =============================================================================
//
// `queue` is the enqueue-once-per-bot dedup layer; `runtime` is the per-bot
// status FSM gated by the license layer (C15) on `STOPPED -> RUNNING`;
// `reconcile` is the post-pause/stop open-order reconciliation pass.
// `mod.rs` ties the three together into one per-bot tick, generalizing the
// teacher's `main.rs` spawn-one-task-per-symbol loop into
// spawn-one-task-per-bot via the queue.
// =============================================================================

pub mod queue;
pub mod reconcile;
pub mod runtime;

pub use queue::{InMemoryQueue, JobQueue, PollQueue};
pub use runtime::{BotRuntime, BotStatus};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::LicenseDecision;
use crate::exchange::adapter::ExchangeAdapter;
use crate::license::LicenseGate;

/// Owns every bot's FSM row plus the job queue; the single coordination
/// point the control-port surfaces (§6 "Bot runtime surface") sit in front
/// of.
pub struct Orchestrator {
    pub queue: Box<dyn JobQueue>,
    pub runtimes: RwLock<HashMap<String, BotRuntime>>,
    pub license: Arc<LicenseGate>,
}

impl Orchestrator {
    pub fn new(queue: Box<dyn JobQueue>, license: Arc<LicenseGate>) -> Self {
        Orchestrator { queue, runtimes: RwLock::new(HashMap::new()), license }
    }

    fn runtime_or_default(&self, bot_id: &str) -> BotRuntime {
        self.runtimes
            .read()
            .get(bot_id)
            .cloned()
            .unwrap_or_else(|| BotRuntime::new(bot_id))
    }

    /// §6 `start(botId, userId)`.
    pub async fn start(
        &self,
        bot_id: &str,
        user_id: &str,
        exchange: &str,
        total_bots: u32,
        running_bots: u32,
    ) -> (bool, LicenseDecision) {
        let mut rt = self.runtime_or_default(bot_id);
        let decision = self
            .license
            .enforce_bot_start_license(user_id, exchange, total_bots, running_bots, rt.status == BotStatus::Running)
            .await;

        if !matches!(decision, LicenseDecision::Ok | LicenseDecision::EnforcementOff) {
            rt.transition_error(decision.to_string());
            self.runtimes.write().insert(bot_id.to_string(), rt);
            return (false, decision);
        }

        rt.transition_running();
        self.runtimes.write().insert(bot_id.to_string(), rt);
        (true, decision)
    }

    pub fn pause(&self, bot_id: &str, reason: impl Into<String>) -> BotStatus {
        let mut rt = self.runtime_or_default(bot_id);
        rt.transition_paused(reason.into());
        let status = rt.status;
        self.runtimes.write().insert(bot_id.to_string(), rt);
        status
    }

    pub fn stop(&self, bot_id: &str, reason: impl Into<String>) -> BotStatus {
        let mut rt = self.runtime_or_default(bot_id);
        rt.transition_stopped(reason.into());
        let status = rt.status;
        self.runtimes.write().insert(bot_id.to_string(), rt);
        status
    }

    /// §6 `enqueueRun(botId)`.
    pub async fn enqueue_run(&self, bot_id: &str) -> queue::EnqueueOutcome {
        self.queue.enqueue_run(bot_id).await
    }

    /// Cancellation semantics (§5): on pause/stop, any in-flight placement is
    /// reconciled next tick via `get_open_orders` rather than being orphaned.
    pub async fn reconcile_bot(
        &self,
        bot_id: &str,
        adapter: &dyn ExchangeAdapter,
        symbol: &crate::exchange::CanonicalSymbol,
        last_known_intent: &[reconcile::IntentRecord],
    ) -> Vec<reconcile::ReconcileAction> {
        let actions = reconcile::reconcile_open_orders(adapter, symbol, last_known_intent).await;
        if !actions.is_empty() {
            info!(bot_id, count = actions.len(), "reconciled open orders after pause/stop");
        }
        actions
    }
}
