//! Transport abstraction for docsync.
//!
//! The engine never manages raw connections itself; a [`Transport`]
//! implementation owns them and delivers already-decoded documents. All
//! operations are fire-and-forget with best-effort delivery and no
//! acknowledgement guarantee.
//!
//! # Design
//!
//! Matching documents are delivered over a typed channel per subscription
//! rather than by re-entrant callbacks: the engine reads [`SourceEvent`]s
//! from [`Subscription::events`], which keeps shared-state reasoning in
//! one place. Every event carries its origin source.
//!
//! Responses that cannot be decoded as the expected document type are the
//! transport's problem and are treated identically to no response - they
//! never reach the channel.

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use docsync_types::{Document, DocumentKind, DocumentQuery, SourceId};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Subscription could not be established.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// A source could not be reached.
    #[error("source unreachable: {0}")]
    Unreachable(SourceId),

    /// Sending a document failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Closed,
}

/// An event delivered on a subscription channel.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A source returned a matching document.
    Document {
        /// The source that delivered it.
        origin: SourceId,
        /// The decoded document.
        document: Document,
    },
    /// A source finished replaying its stored matches; nothing more is
    /// coming from it for this subscription.
    EndOfData {
        /// The source that finished.
        origin: SourceId,
    },
}

/// Cancellation handle for a subscription.
///
/// Safe to call more than once; cancelling stops further deliveries and
/// releases the underlying transport subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    cancelled: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// Create a live handle.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel the subscription. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the subscription has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// An ephemeral subscription: an event channel plus its cancel handle.
pub struct Subscription {
    /// Matching events, tagged with their origin source.
    pub events: mpsc::Receiver<SourceEvent>,
    /// Explicit cancellation; always invoked by the engine on every exit
    /// path, success or timeout.
    pub handle: SubscriptionHandle,
}

/// The connection layer the engine consumes.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issue an ephemeral query against `sources`; matching documents and
    /// end-of-data markers arrive on the returned channel.
    async fn subscribe(
        &self,
        sources: &[SourceId],
        query: &DocumentQuery,
    ) -> Result<Subscription, TransportError>;

    /// Send an already-signed document to `sources`. Best effort.
    async fn publish(
        &self,
        document: &Document,
        sources: &[SourceId],
    ) -> Result<(), TransportError>;

    /// Register for the continuous push stream of documents of `kind`
    /// (not request/response; runs until the receiver is dropped).
    async fn push_documents(&self, kind: DocumentKind) -> mpsc::Receiver<SourceEvent>;

    /// Tear down all connections.
    async fn disconnect_all(&self);
}
