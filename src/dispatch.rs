use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::debug;

use crate::config::Config;
use crate::error::DispatchError;

/// Outbound alert interface used by the detection loop.
///
/// One best-effort send per call. Implementations never retry or queue; the
/// orchestrator decides whether a failure is fatal or merely logged.
pub trait AlertDispatcher {
    /// Compose and send a notification carrying the image as an attachment
    /// plus a human-readable timestamp.
    fn send(&self, image_path: &Path, triggered_at: DateTime<Local>) -> Result<(), DispatchError>;
}

/// Email alert dispatcher.
///
/// Sends the captured image to a fixed recipient over SMTP with STARTTLS.
/// Recipient, credentials, and relay are loaded once at startup; no state is
/// retained between calls.
#[derive(Debug)]
pub struct EmailDispatcher {
    sender: Mailbox,
    recipient: Mailbox,
    subject: String,
    relay: String,
    transport: SmtpTransport,
}

impl EmailDispatcher {
    /// Build a dispatcher from the startup configuration.
    ///
    /// Addresses are parsed eagerly so a typo in the configuration fails at
    /// startup instead of on the first detection.
    pub fn new(config: &Config) -> Result<Self, DispatchError> {
        let sender: Mailbox =
            config
                .sender_email
                .parse()
                .map_err(|e: lettre::address::AddressError| DispatchError::InvalidAddress {
                    address: config.sender_email.clone(),
                    reason: e.to_string(),
                })?;

        let recipient: Mailbox =
            config
                .recipient_email
                .parse()
                .map_err(|e: lettre::address::AddressError| DispatchError::InvalidAddress {
                    address: config.recipient_email.clone(),
                    reason: e.to_string(),
                })?;

        let transport = SmtpTransport::starttls_relay(&config.smtp_relay)
            .map_err(|e| DispatchError::SendFailed {
                relay: config.smtp_relay.clone(),
                reason: e.to_string(),
            })?
            .credentials(Credentials::new(
                config.sender_email.clone(),
                config.email_password.clone(),
            ))
            .build();

        Ok(Self {
            sender,
            recipient,
            subject: config.email_subject.clone(),
            relay: config.smtp_relay.clone(),
            transport,
        })
    }

    fn compose(
        &self,
        image_path: &Path,
        triggered_at: DateTime<Local>,
    ) -> Result<Message, DispatchError> {
        let image = fs::read(image_path).map_err(|e| DispatchError::AttachmentReadFailed {
            path: image_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let filename = image_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("capture.jpg")
            .to_string();

        let body = format!(
            "Motion detected!\n\nTime: {}\nImage: {}\n\nThis is an automated alert from your motion detection system.\n",
            triggered_at.format("%Y-%m-%d %H:%M:%S"),
            filename
        );

        let content_type =
            ContentType::parse("image/jpeg").map_err(|e| DispatchError::ComposeFailed {
                reason: e.to_string(),
            })?;

        Message::builder()
            .from(self.sender.clone())
            .to(self.recipient.clone())
            .subject(self.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body))
                    .singlepart(Attachment::new(filename).body(image, content_type)),
            )
            .map_err(|e| DispatchError::ComposeFailed {
                reason: e.to_string(),
            })
    }
}

impl AlertDispatcher for EmailDispatcher {
    fn send(&self, image_path: &Path, triggered_at: DateTime<Local>) -> Result<(), DispatchError> {
        let message = self.compose(image_path, triggered_at)?;

        match self.transport.send(&message) {
            Ok(_) => {
                debug!("Alert email accepted by {}", self.relay);
                Ok(())
            }
            Err(e) => Err(DispatchError::SendFailed {
                relay: self.relay.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
