// Notification sinks
// Fire-and-forget: a failed message is logged, never propagated into the trading loop

pub mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;

use crate::error::EngineResult;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> EngineResult<()>;
}

/// Send `title` and `body` under a bot tag, swallowing any failure
pub async fn notify(notifier: &dyn Notifier, bot_name: &str, title: &str, body: &str) {
    let text = format!("[{}] {}\n\n{}", bot_name, title, body);
    if let Err(e) = notifier.send(&text).await {
        tracing::warn!(error = %e, "Notification failed");
    }
}

/// Writes notifications to the log only
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> EngineResult<()> {
        tracing::info!("📣 {}", text.replace('\n', " | "));
        Ok(())
    }
}
