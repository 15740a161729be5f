//! Outbound alert transport.
//!
//! The core only needs `send(destination, message)`. The concrete sender is picked once at
//! start-up ([`sender_from_env`]) and injected into the orchestrator.

mod telegram;
mod template;

pub use telegram::TelegramSender;
pub use template::{compose_alert, AlertContext, HELPLINE_LINE};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider rejected message: {0}")]
    Rejected(String),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Transport that delivers one message to one destination.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Short name for logs ("telegram", "log").
    fn name(&self) -> &'static str;

    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError>;
}

/// Sends `message` with an upper bound on wall time. Elapsed time counts as failure.
pub async fn send_bounded(
    sender: &dyn NotificationSender,
    destination: &str,
    message: &str,
    timeout: Duration,
) -> Result<(), NotifyError> {
    match tokio::time::timeout(timeout, sender.send(destination, message)).await {
        Ok(result) => result,
        Err(_) => Err(NotifyError::Timeout(timeout)),
    }
}

/// Development sender: writes the alert to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, _destination: &str, message: &str) -> Result<(), NotifyError> {
        tracing::info!(
            target: "soulsync::notify",
            chars = message.chars().count(),
            "Alert delivered to log sender (no transport configured)"
        );
        Ok(())
    }
}

/// Telegram when `TELEGRAM_BOT_TOKEN` is set, otherwise [`LogSender`].
pub fn sender_from_env() -> Arc<dyn NotificationSender> {
    match TelegramSender::from_env() {
        Some(telegram) => {
            tracing::info!(target: "soulsync::notify", "Using Telegram notification sender");
            Arc::new(telegram)
        }
        None => {
            tracing::warn!(
                target: "soulsync::notify",
                "TELEGRAM_BOT_TOKEN not set; alerts will only be logged"
            );
            Arc::new(LogSender)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowSender;

    #[async_trait]
    impl NotificationSender for SlowSender {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn send(&self, _destination: &str, _message: &str) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn bounded_send_times_out() {
        let limit = Duration::from_millis(20);
        let err = send_bounded(&SlowSender, "123", "hi", limit).await.unwrap_err();
        assert_eq!(err, NotifyError::Timeout(limit));
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        assert!(send_bounded(&LogSender, "123", "hi", Duration::from_secs(1)).await.is_ok());
    }
}
