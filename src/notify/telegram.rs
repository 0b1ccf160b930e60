use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::Notifier;
use crate::error::{EngineError, EngineResult};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const RATE_LIMIT_PER_MINUTE: u32 = 20;
const SEND_TIMEOUT_SECS: u64 = 10;

type TelegramRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Telegram Bot API sender
///
/// Cloneable; clones share the HTTP client and the rate limiter.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
    rate_limiter: Arc<TelegramRateLimiter>,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .map_err(|e| EngineError::Notification(format!("HTTP client: {}", e)))?;

        let per_minute = NonZeroU32::new(RATE_LIMIT_PER_MINUTE).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            client,
            base_url: TELEGRAM_API_BASE.to_string(),
            bot_token,
            chat_id,
            rate_limiter,
        })
    }

    /// Point at another API host (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Built from `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID`; `None` when either is unset
    pub fn from_env() -> Option<EngineResult<Self>> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        if token.is_empty() || chat_id.is_empty() {
            return None;
        }
        Some(Self::new(token, chat_id))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> EngineResult<()> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Notification(format!(
                "Telegram returned {}: {}",
                status, body
            )));
        }

        tracing::debug!("Telegram message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_posts_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTEST_TOKEN/sendMessage")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": "42",
                "text": "<b>hello</b>",
                "parse_mode": "HTML"
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new("TEST_TOKEN".to_string(), "42".to_string())
            .unwrap()
            .with_base_url(server.url());

        tokio_test::assert_ok!(notifier.send("<b>hello</b>").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_surfaces_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/botBAD/sendMessage")
            .with_status(401)
            .with_body(r#"{"ok":false,"description":"Unauthorized"}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new("BAD".to_string(), "42".to_string())
            .unwrap()
            .with_base_url(server.url());

        let err = notifier.send("hi").await.unwrap_err();
        assert!(matches!(err, EngineError::Notification(_)));
        assert!(err.to_string().contains("401"));
    }
}
