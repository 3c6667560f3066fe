//! Race-with-settle fetching: query all sources, return early once the
//! first answer has had a short settle window to be beaten.
//!
//! The fetch subscribes to every source at once and keeps the best
//! (strictly latest) document seen. It returns at whichever comes first:
//! `first_response + settle_window` or the hard timeout; if every source
//! reports end-of-data it returns immediately. The subscription is
//! cancelled on every exit path, so no listener outlives the call.

use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use docsync_types::{Document, DocumentQuery, SourceId, SyncError};

use crate::transport::{SourceEvent, Transport};

/// Fetch the latest document matching `query` from `sources`.
///
/// Returns `Ok(None)` when no source produced a match within the window.
/// An empty source list short-circuits with [`SyncError::NoSources`]
/// before any network activity.
pub async fn fetch_latest<T: Transport>(
    transport: &T,
    sources: &[SourceId],
    query: &DocumentQuery,
    hard_timeout: Duration,
    settle_window: Duration,
) -> Result<Option<Document>, SyncError> {
    if sources.is_empty() {
        return Err(SyncError::NoSources);
    }

    let mut subscription = transport
        .subscribe(sources, query)
        .await
        .map_err(|e| SyncError::Transport(e.to_string()))?;

    let started = Instant::now();
    let hard_deadline = started + hard_timeout;
    let mut deadline = hard_deadline;
    let mut best: Option<Document> = None;
    let mut ended: HashSet<SourceId> = HashSet::new();

    loop {
        tokio::select! {
            event = subscription.events.recv() => match event {
                Some(SourceEvent::Document { origin, document }) => {
                    if best.is_none() {
                        // First hit: collect stragglers briefly, then stop.
                        deadline = deadline.min(Instant::now() + settle_window);
                    }
                    let replace = match &best {
                        Some(current) => document.is_newer_than(current),
                        None => true,
                    };
                    if replace {
                        debug!(source = %origin, created_at = %document.created_at, "new best document");
                        best = Some(document);
                    }
                }
                Some(SourceEvent::EndOfData { origin }) => {
                    ended.insert(origin);
                    if ended.len() >= sources.len() {
                        // Every source has finished replaying; nothing
                        // more can arrive.
                        break;
                    }
                }
                None => break,
            },
            _ = sleep_until(deadline) => break,
        }
    }

    subscription.handle.cancel();
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use docsync_types::{
        AuthorId, Document, DocumentKey, DocumentKind, DocumentPayload, RecordId, Timestamp,
    };
    use std::collections::BTreeSet;

    const HARD: Duration = Duration::from_millis(5000);
    const SETTLE: Duration = Duration::from_millis(500);

    fn members_doc(author: AuthorId, created_at: u64, members: &[AuthorId]) -> Document {
        Document {
            id: RecordId::random(),
            author,
            kind: DocumentKind::ContactList,
            discriminator: None,
            created_at: Timestamp::new(created_at),
            payload: DocumentPayload::Members {
                members: members.iter().copied().collect(),
            },
            signature: vec![],
        }
    }

    #[tokio::test]
    async fn empty_sources_short_circuits() {
        let transport = MockTransport::new();
        let result = fetch_latest(&transport, &[], &DocumentQuery::default(), HARD, SETTLE).await;
        assert!(matches!(result, Err(SyncError::NoSources)));
        assert_eq!(transport.subscribe_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settles_after_first_response_and_keeps_latest() {
        let transport = MockTransport::new();
        let author = AuthorId::random();
        let x = AuthorId::random();
        let y = AuthorId::random();
        let source_a = SourceId::new("wss://a.example");
        let source_b = SourceId::new("wss://b.example");

        // A answers at 50ms with the older document, B at 200ms with the
        // newer one; both land inside the settle window.
        transport.stub_document(&source_a, members_doc(author, 100, &[x]), Duration::from_millis(50));
        transport.stub_document(
            &source_b,
            members_doc(author, 200, &[x, y]),
            Duration::from_millis(200),
        );

        let key = DocumentKey::new(author, DocumentKind::ContactList);
        let started = tokio::time::Instant::now();
        let best = fetch_latest(
            &transport,
            &[source_a, source_b],
            &DocumentQuery::for_key(&key),
            HARD,
            SETTLE,
        )
        .await
        .unwrap()
        .unwrap();
        let elapsed = started.elapsed();

        // Returned at first-response + settle (550ms), not the 5s ceiling.
        assert!(elapsed >= Duration::from_millis(550));
        assert!(elapsed < Duration::from_millis(1000));

        assert_eq!(best.created_at, Timestamp::new(200));
        let expected: BTreeSet<_> = [x, y].into_iter().collect();
        assert_eq!(best.members(), Some(&expected));
    }

    #[tokio::test(start_paused = true)]
    async fn straggler_after_settle_is_missed_then_caught_by_refresh() {
        let transport = MockTransport::new();
        let author = AuthorId::random();
        let source_a = SourceId::new("wss://a.example");
        let source_b = SourceId::new("wss://b.example");

        transport.stub_document(&source_a, members_doc(author, 100, &[]), Duration::from_millis(50));
        // B answers after the settle window closes but before the ceiling.
        transport.stub_document(
            &source_b,
            members_doc(author, 200, &[]),
            Duration::from_millis(900),
        );

        let key = DocumentKey::new(author, DocumentKind::ContactList);
        let query = DocumentQuery::for_key(&key);
        let sources = [source_a, source_b];

        let first = fetch_latest(&transport, &sources, &query, HARD, SETTLE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.created_at, Timestamp::new(100));

        // A refresh that waits the full window picks up the newer version.
        let second = fetch_latest(&transport, &sources, &query, HARD, Duration::from_millis(2000))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.created_at, Timestamp::new(200));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sources_yield_none_at_hard_timeout() {
        let transport = MockTransport::new();
        let source = SourceId::new("wss://silent.example");

        let started = tokio::time::Instant::now();
        let result = fetch_latest(
            &transport,
            &[source],
            &DocumentQuery::default(),
            Duration::from_millis(300),
            SETTLE,
        )
        .await
        .unwrap();

        assert!(result.is_none());
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn all_end_of_data_returns_early() {
        let transport = MockTransport::new();
        let source_a = SourceId::new("wss://a.example");
        let source_b = SourceId::new("wss://b.example");
        transport.stub_end_of_data(&source_a, Duration::from_millis(10));
        transport.stub_end_of_data(&source_b, Duration::from_millis(20));

        let started = tokio::time::Instant::now();
        let result = fetch_latest(
            &transport,
            &[source_a, source_b],
            &DocumentQuery::default(),
            HARD,
            SETTLE,
        )
        .await
        .unwrap();

        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_is_cancelled_on_return() {
        let transport = MockTransport::new();
        let source = SourceId::new("wss://a.example");
        transport.stub_end_of_data(&source, Duration::ZERO);

        fetch_latest(&transport, &[source], &DocumentQuery::default(), HARD, SETTLE)
            .await
            .unwrap();

        assert_eq!(transport.open_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tie_keeps_first_received() {
        let transport = MockTransport::new();
        let author = AuthorId::random();
        let source_a = SourceId::new("wss://a.example");
        let source_b = SourceId::new("wss://b.example");

        let first = members_doc(author, 100, &[]);
        let first_id = first.id;
        transport.stub_document(&source_a, first, Duration::from_millis(10));
        transport.stub_document(&source_b, members_doc(author, 100, &[]), Duration::from_millis(20));

        let key = DocumentKey::new(author, DocumentKind::ContactList);
        let best = fetch_latest(
            &transport,
            &[source_a, source_b],
            &DocumentQuery::for_key(&key),
            HARD,
            SETTLE,
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(best.id, first_id);
    }
}
