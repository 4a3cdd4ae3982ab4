//! SMTP delivery with lettre's blocking transport.
//!
//! Jobs run on blocking threads, so the synchronous transport is used
//! directly. The connection is opened per message.

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, info};

use super::{Notification, Notifier, NotifyError, parse_mailbox};
use crate::config::MailConfig;

/// Sends notifications as plain-text mail.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    sender: Mailbox,
}

impl SmtpNotifier {
    /// Builds a transport for `mail.server` (`host` or `host:port`).
    ///
    /// With `starttls` the connection is upgraded before sending; login is
    /// attempted only when both a user and a password are configured. No
    /// connection is made until the first message.
    pub fn new(mail: &MailConfig) -> Result<Self, NotifyError> {
        let sender = parse_mailbox(&mail.sender)?;
        let (host, port) = split_host_port(&mail.server);

        let mut builder = if mail.starttls {
            SmtpTransport::starttls_relay(host)?
        } else {
            SmtpTransport::builder_dangerous(host)
        };
        if let Some(port) = port {
            builder = builder.port(port);
        }
        if let (Some(user), Some(password)) = (&mail.user, &mail.password) {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                password.expose().to_string(),
            ));
        }

        debug!(host, ?port, starttls = mail.starttls, "SMTP transport configured");
        Ok(SmtpNotifier {
            transport: builder.build(),
            sender,
        })
    }
}

impl Notifier for SmtpNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.sender.clone())
            .to(parse_mailbox(&notification.to)?)
            .subject(notification.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())?;

        self.transport.send(&message)?;
        info!(to = %notification.to, subject = %notification.subject, "Build log mailed");
        Ok(())
    }
}

/// Splits `host:port`. A missing or unparsable port leaves the default.
fn split_host_port(server: &str) -> (&str, Option<u16>) {
    match server.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (server, None),
        },
        None => (server, None),
    }
}
