//! Test doubles for the admission collaborators.
//!
//! Enabled by the `test-utils` feature (on by default).

use crate::artifacts::{Artifact, ArtifactRenderer, RenderError};
use crate::ledger::{InMemoryRegistrantLedger, LedgerError, RegistrantLedger};
use crate::notify::{Delivery, DeliveryError, Notifier};
use crate::types::{EventId, Registrant};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Notifier that records every delivery instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Delivery>>,
    failing: HashSet<String>,
}

impl RecordingNotifier {
    /// Create a notifier that accepts every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail deliveries to `address`.
    #[must_use]
    pub fn failing_for(mut self, address: &str) -> Self {
        self.failing.insert(address.to_string());
        self
    }

    /// Every delivery accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Delivery> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Deliveries accepted for `address`.
    #[must_use]
    pub fn sent_to(&self, address: &str) -> Vec<Delivery> {
        self.sent().into_iter().filter(|d| d.to == address).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        if self.failing.contains(&delivery.to) {
            return Err(DeliveryError::Transport(format!("mailbox {} unavailable", delivery.to)));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(delivery.clone());
        Ok(())
    }
}

/// Renderer that returns a tiny fixed document.
#[derive(Debug, Default)]
pub struct StaticRenderer {
    failure: Option<String>,
    delay: Option<Duration>,
    rendered: AtomicUsize,
}

impl StaticRenderer {
    /// Create a renderer that always succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a renderer that always fails with `reason`.
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Sleep for `delay` before every render.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Documents rendered so far.
    #[must_use]
    pub fn render_count(&self) -> usize {
        self.rendered.load(Ordering::SeqCst)
    }

    async fn render(&self, label: &str) -> Result<Vec<u8>, RenderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(RenderError::Pdf(reason.clone()));
        }
        self.rendered.fetch_add(1, Ordering::SeqCst);
        Ok(format!("%PDF-1.3\n% {label}\n%%EOF\n").into_bytes())
    }
}

#[async_trait]
impl ArtifactRenderer for StaticRenderer {
    async fn render_identity_card(&self, registrant: &Registrant) -> Result<Artifact, RenderError> {
        let bytes = self.render(registrant.event_id.as_str()).await?;
        Ok(Artifact::identity_card(registrant, bytes))
    }

    async fn render_certificate(&self, registrant: &Registrant) -> Result<Artifact, RenderError> {
        let bytes = self.render(&registrant.name).await?;
        Ok(Artifact::certificate(registrant, bytes))
    }
}

/// Ledger whose first `collisions` inserts fail with `DuplicateEventId`.
///
/// Simulates another writer taking the identifier between allocation and
/// insert.
pub struct CollidingLedger {
    inner: InMemoryRegistrantLedger,
    remaining: AtomicU32,
}

impl CollidingLedger {
    /// Wrap `inner`, refusing the next `collisions` inserts.
    #[must_use]
    pub const fn new(inner: InMemoryRegistrantLedger, collisions: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(collisions),
        }
    }
}

#[async_trait]
impl RegistrantLedger for CollidingLedger {
    async fn next_event_id(&self) -> Result<EventId, LedgerError> {
        self.inner.next_event_id().await
    }

    async fn insert(&self, registrant: Registrant) -> Result<Registrant, LedgerError> {
        let collide = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if collide {
            return Err(LedgerError::DuplicateEventId(registrant.event_id));
        }
        self.inner.insert(registrant).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Registrant>, LedgerError> {
        self.inner.find_by_email(email).await
    }

    async fn find_by_event_id(&self, event_id: &EventId) -> Result<Option<Registrant>, LedgerError> {
        self.inner.find_by_event_id(event_id).await
    }

    async fn count(&self) -> Result<u64, LedgerError> {
        self.inner.count().await
    }

    async fn all(&self) -> Result<Vec<Registrant>, LedgerError> {
        self.inner.all().await
    }
}

/// Ledger with artificial latency on the admission path.
///
/// A delayed insert runs on its own task, so it still lands if the caller
/// stops waiting, the way a database commit can outlive a cancelled query.
#[derive(Default)]
pub struct SlowLedger {
    inner: Arc<InMemoryRegistrantLedger>,
    lookup_delay: Option<Duration>,
    insert_delay: Option<Duration>,
}

impl SlowLedger {
    /// Wrap `inner` with no added latency.
    #[must_use]
    pub fn new(inner: InMemoryRegistrantLedger) -> Self {
        Self {
            inner: Arc::new(inner),
            ..Self::default()
        }
    }

    /// Sleep for `delay` before every email lookup.
    #[must_use]
    pub const fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    /// Sleep for `delay` before every insert.
    #[must_use]
    pub const fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }
}

#[async_trait]
impl RegistrantLedger for SlowLedger {
    async fn next_event_id(&self) -> Result<EventId, LedgerError> {
        self.inner.next_event_id().await
    }

    async fn insert(&self, registrant: Registrant) -> Result<Registrant, LedgerError> {
        let Some(delay) = self.insert_delay else {
            return self.inner.insert(registrant).await;
        };
        let inner = Arc::clone(&self.inner);
        let landed = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.insert(registrant).await
        });
        landed
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Registrant>, LedgerError> {
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.find_by_email(email).await
    }

    async fn find_by_event_id(&self, event_id: &EventId) -> Result<Option<Registrant>, LedgerError> {
        self.inner.find_by_event_id(event_id).await
    }

    async fn count(&self) -> Result<u64, LedgerError> {
        self.inner.count().await
    }

    async fn all(&self) -> Result<Vec<Registrant>, LedgerError> {
        self.inner.all().await
    }
}
