//! Mock transport for testing.
//!
//! Scripts per-source replies (with delivery delays) and captures
//! published documents for verification.

use super::{SourceEvent, Subscription, SubscriptionHandle, Transport, TransportError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use docsync_types::{Document, DocumentKind, DocumentQuery, SourceId};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
enum ScriptedReply {
    Document { document: Document, delay: Duration },
    EndOfData { delay: Duration },
}

/// Mock transport for testing.
///
/// Stubbed replies are replayed (with their delays) on every subscribe,
/// so repeated fetch rounds observe the same remote state.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: HashMap<SourceId, Vec<ScriptedReply>>,
    unreachable: HashSet<SourceId>,
    published: Vec<(Document, Vec<SourceId>)>,
    push_senders: HashMap<DocumentKind, Vec<mpsc::Sender<SourceEvent>>>,
    // Keeps subscription channels open until cancel/disconnect, the way a
    // real connection stays up while a query is outstanding.
    subscriptions: Vec<(SubscriptionHandle, mpsc::Sender<SourceEvent>)>,
    subscribe_calls: usize,
    disconnected: bool,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a document reply from `source`, delivered `delay` after a
    /// subscribe that matches it.
    pub fn stub_document(&self, source: &SourceId, document: Document, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .scripts
            .entry(source.clone())
            .or_default()
            .push(ScriptedReply::Document { document, delay });
    }

    /// Script an end-of-data marker from `source`.
    pub fn stub_end_of_data(&self, source: &SourceId, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .scripts
            .entry(source.clone())
            .or_default()
            .push(ScriptedReply::EndOfData { delay });
    }

    /// Make a source fail at subscribe time.
    pub fn make_unreachable(&self, source: &SourceId) {
        let mut inner = self.inner.lock().unwrap();
        inner.unreachable.insert(source.clone());
    }

    /// All `(document, sources)` pairs that were published.
    pub fn published(&self) -> Vec<(Document, Vec<SourceId>)> {
        let inner = self.inner.lock().unwrap();
        inner.published.clone()
    }

    /// Number of subscribe calls made so far.
    pub fn subscribe_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.subscribe_calls
    }

    /// Number of subscriptions that have not been cancelled.
    pub fn open_subscriptions(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .subscriptions
            .iter()
            .filter(|(handle, _)| !handle.is_cancelled())
            .count()
    }

    /// Deliver a document on the push stream for its kind.
    pub fn push_document(&self, origin: &SourceId, document: Document) {
        let senders: Vec<_> = {
            let inner = self.inner.lock().unwrap();
            inner
                .push_senders
                .get(&document.kind)
                .cloned()
                .unwrap_or_default()
        };
        for sender in senders {
            let _ = sender.try_send(SourceEvent::Document {
                origin: origin.clone(),
                document: document.clone(),
            });
        }
    }

    /// Clear all state (scripts, captures, subscriptions).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn subscribe(
        &self,
        sources: &[SourceId],
        query: &DocumentQuery,
    ) -> Result<Subscription, TransportError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = SubscriptionHandle::new();

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.disconnected {
                return Err(TransportError::Closed);
            }
            // A single-source subscribe surfaces unreachability as a
            // transport error; in a multi-source subscribe the dead source
            // simply stays silent.
            if sources.len() == 1 && inner.unreachable.contains(&sources[0]) {
                return Err(TransportError::Unreachable(sources[0].clone()));
            }
            inner.subscribe_calls += 1;

            for source in sources {
                if inner.unreachable.contains(source) {
                    continue;
                }
                for reply in inner.scripts.get(source).cloned().unwrap_or_default() {
                    let event = match reply {
                        ScriptedReply::Document { document, delay } => {
                            if !query.matches(&document) {
                                continue;
                            }
                            (
                                SourceEvent::Document {
                                    origin: source.clone(),
                                    document,
                                },
                                delay,
                            )
                        }
                        ScriptedReply::EndOfData { delay } => (
                            SourceEvent::EndOfData {
                                origin: source.clone(),
                            },
                            delay,
                        ),
                    };
                    let (event, delay) = event;
                    let tx = tx.clone();
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if !handle.is_cancelled() {
                            let _ = tx.send(event).await;
                        }
                    });
                }
            }
            inner.subscriptions.push((handle.clone(), tx));
        }

        Ok(Subscription { events: rx, handle })
    }

    async fn publish(
        &self,
        document: &Document,
        sources: &[SourceId],
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.disconnected {
            return Err(TransportError::Closed);
        }
        inner.published.push((document.clone(), sources.to_vec()));
        Ok(())
    }

    async fn push_documents(&self, kind: DocumentKind) -> mpsc::Receiver<SourceEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut inner = self.inner.lock().unwrap();
        inner.push_senders.entry(kind).or_default().push(tx);
        rx
    }

    async fn disconnect_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        for (handle, _) in &inner.subscriptions {
            handle.cancel();
        }
        inner.subscriptions.clear();
        inner.push_senders.clear();
        inner.disconnected = true;
    }
}
