//! Telegram Bot API sender. Destination is the contact's chat id.

use super::{NotificationSender, NotifyError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct BotUser {
    #[serde(default)]
    username: Option<String>,
}

pub struct TelegramSender {
    token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramSender {
    /// `None` when `TELEGRAM_BOT_TOKEN` is unset or blank.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        Some(Self::new(token.to_string()))
    }

    pub fn new(token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            token: token.trim().to_string(),
            api_base: TELEGRAM_API_BASE.to_string(),
            client,
        }
    }

    /// Point at a different Bot API server (self-hosted or a local stub).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Calls `getMe`; returns the bot username.
    pub async fn check_connection(&self) -> Result<String, NotifyError> {
        let res = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(transport)?;
        let parsed: TelegramResponse<BotUser> = res.json().await.map_err(transport)?;
        if !parsed.ok {
            return Err(NotifyError::Rejected(
                parsed.description.unwrap_or_else(|| "getMe failed".to_string()),
            ));
        }
        Ok(parsed.result.and_then(|u| u.username).unwrap_or_default())
    }
}

/// reqwest errors carry the request URL, which contains the bot token.
fn transport(err: reqwest::Error) -> NotifyError {
    NotifyError::Transport(err.without_url().to_string())
}

fn interpret(status: reqwest::StatusCode, body: &str) -> Result<(), NotifyError> {
    let parsed: Option<TelegramResponse<serde_json::Value>> = serde_json::from_str(body).ok();
    match parsed {
        Some(r) if r.ok && status.is_success() => Ok(()),
        Some(r) => Err(NotifyError::Rejected(format!(
            "{}: {}",
            status,
            r.description.unwrap_or_else(|| "no description".to_string())
        ))),
        None => Err(NotifyError::Rejected(format!("{}: unreadable response", status))),
    }
}

#[async_trait]
impl NotificationSender for TelegramSender {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError> {
        let body = SendMessageRequest {
            chat_id: destination,
            text: message,
            disable_web_page_preview: true,
        };
        let res = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let status = res.status();
        let text = res.text().await.map_err(transport)?;
        interpret(status, &text)?;
        tracing::debug!(target: "soulsync::notify", "Telegram sendMessage accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn method_url_embeds_token() {
        let s = TelegramSender::new(" abc:123 ".into()).with_api_base("http://localhost:8081/");
        assert_eq!(s.method_url("sendMessage"), "http://localhost:8081/botabc:123/sendMessage");
    }

    #[test]
    fn ok_response_is_success() {
        assert!(interpret(StatusCode::OK, r#"{"ok":true,"result":{"message_id":7}}"#).is_ok());
    }

    #[test]
    fn api_error_is_rejected_with_description() {
        let err = interpret(
            StatusCode::BAD_REQUEST,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap_err();
        match err {
            NotifyError::Rejected(msg) => assert!(msg.contains("chat not found")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_body_is_rejected() {
        assert!(matches!(
            interpret(StatusCode::BAD_GATEWAY, "<html>"),
            Err(NotifyError::Rejected(_))
        ));
    }

    #[test]
    fn request_body_shape() {
        let body = SendMessageRequest {
            chat_id: "42",
            text: "hello",
            disable_web_page_preview: true,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["chat_id"], "42");
        assert_eq!(v["text"], "hello");
    }
}
