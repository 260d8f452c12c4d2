use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub mod twilio;
pub mod webhook;

pub use twilio::TwilioNotifier;
pub use webhook::WebhookNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("notification rejected with status {0}")]
    Rejected(u16),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Delivers state-change alerts to check owners.
///
/// Delivery is best-effort: the monitoring engine logs and drops any error.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError>;
}

/// Emits alerts as tracing events instead of sending them anywhere
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        info!(%recipient, "{message}");
        Ok(())
    }
}
