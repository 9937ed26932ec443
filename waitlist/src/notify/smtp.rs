//! SMTP notifier using Lettre.

use super::{Delivery, DeliveryError, Notifier};
use crate::artifacts::PDF_CONTENT_TYPE;
use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Sends real email through an SMTP relay.
///
/// Uses implicit TLS (port 465 style) unless STARTTLS is configured. The
/// transport keeps a connection pool and is shared by all sends.
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Build a notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidAddress`] for a bad sender address
    /// and [`DeliveryError::Transport`] if the relay cannot be configured.
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| DeliveryError::InvalidAddress(format!("from address: {e}")))?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        }
        .map_err(|e| DeliveryError::Transport(format!("SMTP relay error: {e}")))?;

        let mut builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, delivery: &Delivery) -> Result<Message, DeliveryError> {
        let to: Mailbox = delivery
            .to
            .parse()
            .map_err(|e| DeliveryError::InvalidAddress(format!("{}: {e}", delivery.to)))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(delivery.subject.clone());

        let message = match &delivery.attachment {
            Some(artifact) => {
                let content_type = ContentType::parse(PDF_CONTENT_TYPE)
                    .map_err(|e| DeliveryError::Message(e.to_string()))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(delivery.body.clone()))
                        .singlepart(
                            Attachment::new(artifact.filename.clone())
                                .body(artifact.bytes.clone(), content_type),
                        ),
                )
            },
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(delivery.body.clone()),
        };

        message.map_err(|e| DeliveryError::Message(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    #[tracing::instrument(skip_all, fields(to = %delivery.to, subject = %delivery.subject))]
    async fn send(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        let message = self.build_message(delivery)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        tracing::info!("Email sent");
        Ok(())
    }
}
