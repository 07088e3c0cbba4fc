// Mail sending module
// Capability trait only; the production transport lives behind it as a
// deployment concern

use async_trait::async_trait;
use tracing::info;

/// Mail-sending errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailerError {
    Transport(String),
}

impl std::fmt::Display for MailerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailerError::Transport(msg) => write!(f, "Mail transport error: {}", msg),
        }
    }
}

impl std::error::Error for MailerError {}

/// Outbound mail capability
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, title: &str, message: &str) -> Result<(), MailerError>;
}

/// Mailer that only records the send; used in development and tests
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, title: &str, _message: &str) -> Result<(), MailerError> {
        info!("Mail \"{}\" to {}", title, to);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_accepts_sends() {
        let mailer = LogMailer;

        mailer
            .send("alice@example.com", "Welcome", "Hello!")
            .await
            .unwrap();
    }
}
