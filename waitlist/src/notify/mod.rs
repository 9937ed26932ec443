//! Delivery of artifacts to registrants.

mod console;
mod smtp;

pub use console::ConsoleNotifier;
pub use smtp::SmtpNotifier;

use crate::artifacts::Artifact;
use crate::types::Registrant;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from notification delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Sender or recipient address could not be parsed
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// The message could not be assembled
    #[error("failed to build message: {0}")]
    Message(String),
    /// The transport rejected or failed to send the message
    #[error("failed to send message: {0}")]
    Transport(String),
}

/// One outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
    /// Attached document
    pub attachment: Option<Artifact>,
}

/// Sends messages to registrants.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `delivery`.
    async fn send(&self, delivery: &Delivery) -> Result<(), DeliveryError>;
}

/// Subject and body wording for registrant emails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplates {
    /// Event name used in subjects
    pub event_name: String,
    /// Sign-off line
    pub signature: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            event_name: "AHAPN Edo 2025".to_string(),
            signature: "AHAPN Team".to_string(),
        }
    }
}

impl MessageTemplates {
    /// Welcome message carrying the identity card.
    #[must_use]
    pub fn welcome(&self, registrant: &Registrant, card: Artifact) -> Delivery {
        Delivery {
            to: registrant.email.clone(),
            subject: format!("Welcome to {} Waitlist", self.event_name),
            body: format!(
                "Dear {},\n\nYour Event ID: {}\n\nBest regards,\n{}",
                registrant.name, registrant.event_id, self.signature
            ),
            attachment: Some(card),
        }
    }

    /// Certificate message.
    #[must_use]
    pub fn certificate(&self, registrant: &Registrant, certificate: Artifact) -> Delivery {
        Delivery {
            to: registrant.email.clone(),
            subject: format!("Your {} Certificate", self.event_name),
            body: format!(
                "Dear {},\n\nAttached is your certificate.\n\nBest regards,\n{}",
                registrant.name, self.signature
            ),
            attachment: Some(certificate),
        }
    }
}
