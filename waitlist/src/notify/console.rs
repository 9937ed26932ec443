//! Console notifier for development.

use super::{Delivery, DeliveryError, Notifier};
use async_trait::async_trait;
use tracing::info;

/// Logs messages instead of sending them.
///
/// Selected automatically when no SMTP credentials are configured.
#[derive(Clone, Debug, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    /// Create a console notifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        info!(
            to = %delivery.to,
            subject = %delivery.subject,
            attachment = delivery.attachment.as_ref().map(|a| a.filename.as_str()),
            attachment_bytes = delivery.attachment.as_ref().map(|a| a.bytes.len()),
            "📧 Email (Development Mode)"
        );
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║ To: {:<57}║", delivery.to);
        println!("║ Subject: {:<52}║", delivery.subject);
        println!("╠══════════════════════════════════════════════════════════════╣");
        for line in delivery.body.lines() {
            println!("║ {line:<61}║");
        }
        if let Some(attachment) = &delivery.attachment {
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ Attachment: {:<49}║", attachment.filename);
        }
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        Ok(())
    }
}
