//! Operator notifications with a global cooldown.
//!
//! One cooldown window is shared by every alert kind: any delivered alert
//! pushes the next eligible delivery out by `ALERT_COOLDOWN`, so a flapping
//! candidate set cannot flood the operator. Delivery is best-effort.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::SteerError;
use crate::store::Store;

/// Delivery channel for operator notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message.
    async fn notify(&self, message: &str) -> Result<(), SteerError>;
}

/// Send `message` unless inside the cooldown window.
///
/// Returns true when delivery was attempted. The cooldown stamp advances
/// before delivery; a failed delivery still consumes the window (the
/// condition the alert reports will still hold next tick).
pub async fn fire(
    store: &Store,
    notifier: &dyn Notifier,
    cooldown_secs: u64,
    message: &str,
    now_epoch: i64,
) -> Result<bool, SteerError> {
    let last = store.read_last_alert()?;
    if now_epoch - last < cooldown_secs as i64 {
        debug!(message, "alert suppressed by cooldown");
        return Ok(false);
    }

    store.write_last_alert(now_epoch)?;
    warn!(message, "alerting operator");
    if let Err(e) = notifier.notify(message).await {
        warn!("alert delivery failed: {e}");
    }
    Ok(true)
}

/// Telegram `sendMessage` delivery to the allowed operator chat.
pub struct TelegramNotifier {
    api_base: String,
    token: String,
    chat_id: i64,
    client: reqwest::Client,
}

impl TelegramNotifier {
    /// Build a notifier, honoring the optional outbound proxy.
    pub fn new(
        api_base: String,
        token: String,
        chat_id: i64,
        proxy: Option<&str>,
    ) -> Result<Self, SteerError> {
        let mut builder = reqwest::Client::builder().timeout(std::time::Duration::from_secs(10));
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            chat_id,
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<(), SteerError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": message,
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SteerError::provider(status.as_u16(), &body));
        }
        Ok(())
    }
}

/// Discards messages; used when Telegram is not configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, message: &str) -> Result<(), SteerError> {
        debug!(message, "no notification channel configured, dropping alert");
        Ok(())
    }
}
