// =============================================================================
// Notification Output Port (C16)
// =============================================================================
//
// A single `NotificationSink` trait with one thin `reqwest`-based
// implementation. Deliberately minimal per the Non-goals (no templating, no
// delivery-retry policy, no multi-channel routing) — this is the same
// "sink" shape as the teacher's outbound HTTP notifiers, kept down to the
// one method the control plane actually calls.
// =============================================================================

pub mod telegram;

pub use telegram::TelegramSink;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub text: String,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// No-op sink for deployments without a configured channel.
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn notify(&self, _notification: &Notification) -> anyhow::Result<()> {
        Ok(())
    }
}
