//! Multi-source aggregation: query every source, keep provenance, reduce.
//!
//! One aggregation run fans out a bounded-concurrency query round over the
//! full source list, records a terminal status per source, and reduces the
//! successful answers to a canonical latest-wins document. The reducer
//! never writes any cache - the caller decides whether to trust and apply
//! the outcome (identity-owned documents may need user confirmation first).
//!
//! Progressive snapshots of the session are published on a watch channel
//! so a UI can render per-source state while the round is still running.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use docsync_core::session::AggregationSession;
use docsync_types::{Document, DocumentQuery, SourceId, SyncError, Timestamp};

use crate::fanout::fan_out;
use crate::transport::{SourceEvent, Transport};

/// The result of one aggregation run.
#[derive(Debug, Clone)]
pub struct AggregationOutcome {
    /// Identifies the run in logs and progressive snapshots.
    pub session_id: Uuid,
    /// The reduced latest-wins document, if any source succeeded.
    pub canonical: Option<Document>,
    /// The settled session: per-source statuses and provenance.
    pub session: AggregationSession,
}

impl AggregationOutcome {
    /// Sources whose returned document is strictly older than canonical.
    pub fn stale_sources(&self) -> Vec<SourceId> {
        self.session.stale_sources()
    }
}

/// Runs aggregation rounds against a transport.
pub struct Aggregator<T: Transport> {
    transport: Arc<T>,
    per_source_timeout: Duration,
    batch_size: usize,
    stagger: Duration,
}

impl<T: Transport> Aggregator<T> {
    /// Create an aggregator.
    pub fn new(
        transport: Arc<T>,
        per_source_timeout: Duration,
        batch_size: usize,
        stagger: Duration,
    ) -> Self {
        Self {
            transport,
            per_source_timeout,
            batch_size,
            stagger,
        }
    }

    /// Run one aggregation round over `sources`.
    ///
    /// Per-source failures never abort the round; they are recorded as
    /// statuses and the round proceeds with whatever succeeded. When a
    /// `progress` sender is supplied, a session snapshot is published
    /// after every per-source completion.
    pub async fn run(
        &self,
        sources: &[SourceId],
        query: &DocumentQuery,
        progress: Option<watch::Sender<AggregationSession>>,
    ) -> Result<AggregationOutcome, SyncError> {
        if sources.is_empty() {
            return Err(SyncError::NoSources);
        }

        let session_id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(AggregationSession::new(sources)));
        debug!(%session_id, sources = sources.len(), "aggregation started");

        let per_source_timeout = self.per_source_timeout;
        fan_out(sources, self.batch_size, self.stagger, |source| {
            let session = Arc::clone(&session);
            let transport = Arc::clone(&self.transport);
            let query = query.clone();
            let progress = progress.clone();
            async move {
                let outcome =
                    query_source(transport.as_ref(), &source, &query, per_source_timeout).await;
                let mut session = session.lock().await;
                match outcome {
                    Ok(Some(document)) => {
                        session.record_success(&source, document, Timestamp::now());
                    }
                    Ok(None) => {
                        session.record_no_data(&source);
                    }
                    Err(SyncError::Timeout) => {
                        session.record_timeout(&source);
                    }
                    Err(error) => {
                        warn!(source = %source, %error, "source query failed");
                        session.record_failure(&source);
                    }
                }
                if let Some(progress) = &progress {
                    let _ = progress.send(session.clone());
                }
            }
        })
        .await;

        let mut session = session.lock().await;
        session.finish();
        let canonical = session.canonical().cloned();
        if let Some(progress) = &progress {
            let _ = progress.send(session.clone());
        }
        debug!(
            %session_id,
            results = session.results().len(),
            canonical = canonical.is_some(),
            "aggregation settled"
        );

        Ok(AggregationOutcome {
            session_id,
            canonical,
            session: session.clone(),
        })
    }

    /// Resend an already-finalized document verbatim to sources holding an
    /// older version. A repair/propagation action, not a new mutation: the
    /// document is not re-derived or re-signed.
    pub async fn republish(
        &self,
        document: &Document,
        stale: &[SourceId],
    ) -> Result<(), SyncError> {
        if stale.is_empty() {
            return Ok(());
        }
        debug!(id = %document.id, sources = stale.len(), "republishing to stale sources");
        self.transport
            .publish(document, stale)
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))
    }
}

/// Query a single source for its best match, bounded by `deadline`.
///
/// `Ok(Some)` - the source returned a document (even if it never got to
/// end-of-data before the deadline). `Ok(None)` - the source finished with
/// nothing matching. `Err(Timeout)` - silence until the deadline.
/// Other errors are transport failures.
async fn query_source<T: Transport>(
    transport: &T,
    source: &SourceId,
    query: &DocumentQuery,
    deadline: Duration,
) -> Result<Option<Document>, SyncError> {
    let mut subscription = transport
        .subscribe(std::slice::from_ref(source), query)
        .await
        .map_err(|e| SyncError::Transport(e.to_string()))?;

    let deadline = Instant::now() + deadline;
    let mut best: Option<Document> = None;
    let mut finished = false;
    let mut timed_out = false;

    loop {
        tokio::select! {
            event = subscription.events.recv() => match event {
                Some(SourceEvent::Document { document, .. }) => {
                    let replace = match &best {
                        Some(current) => document.is_newer_than(current),
                        None => true,
                    };
                    if replace {
                        best = Some(document);
                    }
                }
                Some(SourceEvent::EndOfData { .. }) => {
                    finished = true;
                    break;
                }
                None => break,
            },
            _ = sleep_until(deadline) => {
                timed_out = true;
                break;
            }
        }
    }
    subscription.handle.cancel();

    match (best, finished, timed_out) {
        (Some(document), _, _) => Ok(Some(document)),
        (None, true, _) => Ok(None),
        (None, false, true) => Err(SyncError::Timeout),
        (None, false, false) => Err(SyncError::Transport("stream closed".to_string())),
    }
}
