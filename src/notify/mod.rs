// Outbound notifications (Telegram or log only)

pub mod messages;
pub mod telegram;

pub use telegram::TelegramNotifier;

use crate::Result;

/// Delivery channel for human-readable trade events
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Writes messages to the log instead of a chat
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        tracing::info!("📣 {}", message);
        Ok(())
    }
}

/// Either a Telegram chat or the log, picked from settings
pub enum AnyNotifier {
    Telegram(TelegramNotifier),
    Log(LogNotifier),
}

impl Notifier for AnyNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        match self {
            AnyNotifier::Telegram(n) => n.send(message).await,
            AnyNotifier::Log(n) => n.send(message).await,
        }
    }
}

/// Send and swallow failures; a lost message never fails a pass
pub async fn deliver<N: Notifier>(notifier: &N, message: &str) {
    if let Err(e) = notifier.send(message).await {
        tracing::warn!("⚠️  Failed to send notification: {}", e);
    }
}
