//! Delivery of build transcripts to the person who pushed.
//!
//! Notification is best effort: a job reports a delivery failure in the log
//! and carries on with cleanup. Nothing is retried.

pub mod smtp;

use std::sync::Arc;

use lettre::address::AddressError;
use lettre::message::Mailbox;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::MailConfig;

pub use smtp::SmtpNotifier;

/// Errors from sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// A sender or recipient is not a valid mailbox.
    #[error("invalid mail address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: AddressError,
    },

    /// The message could not be assembled.
    #[error("cannot build message: {0}")]
    Message(#[from] lettre::error::Error),

    /// The SMTP server refused the message or could not be reached.
    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// A finished transcript addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Sends notifications. Shared by every job, so it must be thread-safe.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Used when mail is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            to = %notification.to,
            subject = %notification.subject,
            "Mail not configured, build log not sent"
        );
        debug!(body = %notification.body, "Build log");
        Ok(())
    }
}

/// Picks the notifier for the configured mail settings.
pub fn from_config(mail: Option<&MailConfig>) -> Result<Arc<dyn Notifier>, NotifyError> {
    match mail {
        Some(mail) => Ok(Arc::new(SmtpNotifier::new(mail)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}

/// Parses `address` as a mailbox (`user@host` or `Name <user@host>`).
pub fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })
}
