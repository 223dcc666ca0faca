// =============================================================================
// Bot Status FSM (C13)
// =============================================================================
//
// `STOPPED -> RUNNING -> {PAUSED, STOPPED, ERROR}`. Only `STOPPED->RUNNING`
// is license-gated (§4.15, enforced by the orchestrator's `start`, not here
// — this module only encodes the transition legality and `reason` handling).
// Mirrors `Bot.status`/`BotRuntime.status` as one row per bot.
// =============================================================================

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BotStatus {
    Stopped,
    Running,
    Paused,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotRuntime {
    pub bot_id: String,
    pub status: BotStatus,
    pub reason: Option<String>,
    pub updated_at: i64,
}

impl BotRuntime {
    pub fn new(bot_id: &str) -> Self {
        BotRuntime { bot_id: bot_id.to_string(), status: BotStatus::Stopped, reason: None, updated_at: Utc::now().timestamp_millis() }
    }

    /// `reason` is cleared on transition to `RUNNING` (§4.13).
    pub fn transition_running(&mut self) {
        self.status = BotStatus::Running;
        self.reason = None;
        self.updated_at = Utc::now().timestamp_millis();
    }

    pub fn transition_paused(&mut self, reason: String) {
        self.status = BotStatus::Paused;
        self.reason = Some(reason);
        self.updated_at = Utc::now().timestamp_millis();
    }

    pub fn transition_stopped(&mut self, reason: String) {
        self.status = BotStatus::Stopped;
        self.reason = Some(reason);
        self.updated_at = Utc::now().timestamp_millis();
    }

    pub fn transition_error(&mut self, reason: String) {
        self.status = BotStatus::Error;
        self.reason = Some(reason);
        self.updated_at = Utc::now().timestamp_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_clears_reason() {
        let mut rt = BotRuntime::new("bot1");
        rt.transition_error("boom".to_string());
        assert!(rt.reason.is_some());
        rt.transition_running();
        assert_eq!(rt.status, BotStatus::Running);
        assert!(rt.reason.is_none());
    }

    #[test]
    fn pause_and_stop_carry_reason() {
        let mut rt = BotRuntime::new("bot1");
        rt.transition_running();
        rt.transition_paused("manual pause".to_string());
        assert_eq!(rt.status, BotStatus::Paused);
        assert_eq!(rt.reason.as_deref(), Some("manual pause"));
    }
}
