use super::Notifier;
use crate::config::TelegramSettings;
use crate::{Error, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Bot API `sendMessage` in HTML parse mode
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

impl TelegramNotifier {
    /// Returns `None` when token or chat id is missing
    pub fn from_settings(settings: &TelegramSettings) -> Result<Option<Self>> {
        let Some((token, chat_id)) = settings.credentials() else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Some(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        }))
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text: message,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notify(format!("telegram returned {status}: {body}")));
        }
        Ok(())
    }
}
