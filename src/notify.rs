//! Discord/Telegram notifications.
//!
//! Strictly best-effort: failures are logged and swallowed, and a per-key
//! cooldown map keeps repeated events from flooding the channels. Nothing
//! here may ever block or fail a trading decision.

use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const TRADE_COOLDOWN: Duration = Duration::from_secs(30 * 60);
const CRISIS_COOLDOWN: Duration = Duration::from_secs(5 * 60);

pub struct Notifier {
    http: reqwest::Client,
    discord_webhook_url: String,
    telegram_bot_token: String,
    telegram_chat_id: String,
    cooldowns: Mutex<HashMap<String, Instant>>,
}

impl Notifier {
    pub fn new(
        discord_webhook_url: String,
        telegram_bot_token: String,
        telegram_chat_id: String,
    ) -> crate::error::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            discord_webhook_url,
            telegram_bot_token,
            telegram_chat_id,
            cooldowns: Mutex::new(HashMap::new()),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.discord_webhook_url.is_empty() || !self.telegram_bot_token.is_empty()
    }

    /// Trade events: 30-minute cooldown per key.
    pub async fn notify_trade(&self, key: &str, message: &str) {
        self.notify(key, message, TRADE_COOLDOWN).await;
    }

    /// Crisis events: 5-minute cooldown per key.
    pub async fn notify_crisis(&self, key: &str, message: &str) {
        self.notify(key, message, CRISIS_COOLDOWN).await;
    }

    async fn notify(&self, key: &str, message: &str, cooldown: Duration) {
        if !self.is_configured() {
            return;
        }
        {
            let mut map = self.cooldowns.lock().await;
            if let Some(last) = map.get(key) {
                if last.elapsed() < cooldown {
                    debug!("notification for {key} suppressed by cooldown");
                    return;
                }
            }
            map.insert(key.to_string(), Instant::now());
        }

        if !self.discord_webhook_url.is_empty() {
            let result = self
                .http
                .post(&self.discord_webhook_url)
                .json(&json!({ "content": message }))
                .send()
                .await;
            if let Err(e) = result {
                warn!("discord notification failed: {e}");
            }
        }
        if !self.telegram_bot_token.is_empty() && !self.telegram_chat_id.is_empty() {
            let url = format!(
                "https://api.telegram.org/bot{}/sendMessage",
                self.telegram_bot_token
            );
            let result = self
                .http
                .post(&url)
                .json(&json!({ "chat_id": self.telegram_chat_id, "text": message }))
                .send()
                .await;
            if let Err(e) = result {
                warn!("telegram notification failed: {e}");
            }
        }
    }
}
