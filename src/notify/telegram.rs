// =============================================================================
// Telegram Sink (C16)
// =============================================================================
//
// One bot token, one chat id, one `sendMessage` call. No formatting beyond
// a plain text field. Grounded on the teacher's outbound-HTTP-call idiom
// (`reqwest::Client` + `.context(...)`).
// =============================================================================

use anyhow::Context;
use async_trait::async_trait;

use super::{Notification, NotificationSink};

pub struct TelegramSink {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        TelegramSink {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build reqwest client for TelegramSink"),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        self.client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": notification.text,
            }))
            .send()
            .await
            .context("telegram sendMessage failed")?
            .error_for_status()
            .context("telegram sendMessage returned non-2xx")?;
        Ok(())
    }
}
