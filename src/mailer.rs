use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};

use crate::config::SmtpConfig;

const CONFIRMATION_SUBJECT: &str = "Title review registration";

/// MailError
///
/// Delivery failures. Surfaced to clients as a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),

    /// Raised by `MockMailer::new_failing` only.
    #[error("Simulated delivery failure")]
    Simulated,
}

/// OutgoingMessage
///
/// A plain-text message handed to a `NotificationSender`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMessage {
    pub fn confirmation_code(to: &str, code: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: CONFIRMATION_SUBJECT.to_string(),
            body: format!("Your confirmation code: {code}"),
        }
    }
}

/// NotificationSender
///
/// Out-of-band delivery of confirmation codes. Swapped between SMTP, log-only and
/// an in-memory recorder without touching the handlers.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, message: OutgoingMessage) -> Result<(), MailError>;
}

/// MailerState
///
/// The concrete type used to share the sender across the application state.
pub type MailerState = Arc<dyn NotificationSender>;

/// SmtpMailer
///
/// Sends through an SMTP relay with STARTTLS (lettre's async tokio transport).
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, from: &str) -> Result<Self, MailError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);
        if let (Some(user), Some(pass)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSender for SmtpMailer {
    async fn send(&self, message: OutgoingMessage) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(message.to.parse()?)
            .subject(message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body)
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport.send(email).await?;
        tracing::info!(to = %message.to, "confirmation email sent");
        Ok(())
    }
}

/// LogMailer
///
/// Local development sender: writes the message to the log instead of mailing it.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl NotificationSender for LogMailer {
    async fn send(&self, message: OutgoingMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "SMTP not configured, logging outgoing email"
        );
        Ok(())
    }
}

/// MockMailer
///
/// Records every message in memory so tests can read back the confirmation code.
#[derive(Clone, Default)]
pub struct MockMailer {
    /// When true, every send fails with `MailError::Simulated`.
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<OutgoingMessage>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// The code from the most recent message sent to `to`, if any.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.to == to)
            .and_then(|m| m.body.rsplit(' ').next().map(str::to_string))
    }
}

#[async_trait]
impl NotificationSender for MockMailer {
    async fn send(&self, message: OutgoingMessage) -> Result<(), MailError> {
        if self.should_fail {
            return Err(MailError::Simulated);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_mailer_records_codes() {
        let mailer = MockMailer::new();
        mailer
            .send(OutgoingMessage::confirmation_code("bob@x.com", "abc-123"))
            .await
            .unwrap();
        assert_eq!(mailer.last_code_for("bob@x.com").as_deref(), Some("abc-123"));
        assert_eq!(mailer.last_code_for("alice@x.com"), None);
    }

    #[tokio::test]
    async fn failing_mock_reports_errors() {
        let mailer = MockMailer::new_failing();
        let result = mailer
            .send(OutgoingMessage::confirmation_code("bob@x.com", "abc"))
            .await;
        assert!(matches!(result, Err(MailError::Simulated)));
        assert!(mailer.sent().is_empty());
    }

    #[test]
    fn address_errors_display() {
        let err: Result<lettre::Address, _> = "not-an-email".parse();
        let err = MailError::Address(err.unwrap_err());
        assert!(err.to_string().contains("Email address parse error"));
    }
}
