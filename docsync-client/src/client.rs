//! The main sync client: cache-first reads, coalesced fetches,
//! exhaustive aggregation, and membership publishing.
//!
//! # Example
//!
//! ```no_run
//! use docsync_client::{DocSyncClient, MockSigner, MockTransport, SyncConfig};
//! use docsync_types::SourceId;
//!
//! # async fn example() -> Result<(), docsync_types::SyncError> {
//! let config = SyncConfig::new(vec![SourceId::new("wss://relay.example")]);
//! let client = DocSyncClient::new(config, MockTransport::new(), MockSigner::new());
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use docsync_core::cache::TtlCache;
use docsync_core::membership::{apply_member_op, MemberOp};
use docsync_core::session::AggregationSession;
use docsync_types::{
    AuthorId, Document, DocumentDraft, DocumentKey, DocumentPayload, DocumentQuery, SourceId,
    SyncError, Timestamp,
};

use crate::aggregate::{AggregationOutcome, Aggregator};
use crate::config::SyncConfig;
use crate::fetch::fetch_latest;
use crate::signer::Signer;
use crate::singleflight::SingleFlight;
use crate::store::{Persistence, STORE_NAMESPACE};
use crate::transport::Transport;

/// Key under which the document cache snapshot is persisted.
const CACHE_KEY: &str = "documents";

/// Where a cached document came from.
///
/// Only `Remote` and `Published` documents are authoritative bases for
/// further mutations; an `Optimistic` entry is a local guess that has
/// never been confirmed by any source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOrigin {
    /// Fetched or aggregated from sources.
    Remote,
    /// Authored locally and successfully published.
    Published,
    /// Authored locally for immediate UI feedback, not yet published.
    Optimistic,
}

/// A document plus the provenance of its cache entry.
#[derive(Debug, Clone)]
pub struct CachedDocument {
    /// The cached document.
    pub document: Document,
    /// How the entry got into the cache.
    pub origin: DocumentOrigin,
}

/// The client-side sync engine.
///
/// Each read goes cache → coalesced race-with-settle fetch; writes go
/// through the signer and out to every configured source. The client is
/// cheap to share behind an `Arc`.
pub struct DocSyncClient<T: Transport> {
    config: SyncConfig,
    transport: Arc<T>,
    signer: Arc<dyn Signer>,
    cache: Mutex<TtlCache<DocumentKey, CachedDocument>>,
    flights: SingleFlight<DocumentKey, Option<Document>, SyncError>,
    docs_tx: watch::Sender<Option<Document>>,
    session_tx: watch::Sender<AggregationSession>,
}

impl<T: Transport> DocSyncClient<T> {
    /// Create a client over `transport`, signing with `signer`.
    pub fn new(config: SyncConfig, transport: T, signer: impl Signer + 'static) -> Self {
        let (docs_tx, _) = watch::channel(None);
        let (session_tx, _) = watch::channel(AggregationSession::new(&config.sources));
        Self {
            cache: Mutex::new(TtlCache::with_capacity(config.cache_capacity)),
            config,
            transport: Arc::new(transport),
            signer: Arc::new(signer),
            flights: SingleFlight::new(),
            docs_tx,
            session_tx,
        }
    }

    // ===== Reads =====

    /// Get the latest document at `key`, serving from cache when fresh.
    ///
    /// A cache miss races all configured sources and caches the winner.
    /// Concurrent misses for the same key share one fetch.
    pub async fn document(&self, key: &DocumentKey) -> Result<Option<Document>, SyncError> {
        {
            let mut cache = self.lock_cache();
            if let Some(cached) = cache.get(key, Instant::now().into_std()) {
                debug!(?key, "cache hit");
                return Ok(Some(cached.document.clone()));
            }
        }
        self.fetch_via_flight(key.clone()).await
    }

    /// Fetch the latest document at `key` from the sources, bypassing any
    /// cached entry (but still sharing in-flight fetches).
    pub async fn force_refresh(&self, key: &DocumentKey) -> Result<Option<Document>, SyncError> {
        self.fetch_via_flight(key.clone()).await
    }

    async fn fetch_via_flight(&self, key: DocumentKey) -> Result<Option<Document>, SyncError> {
        let transport = Arc::clone(&self.transport);
        let sources = self.config.sources.clone();
        let query = DocumentQuery::for_key(&key);
        let hard_timeout = self.config.hard_timeout;
        let settle_window = self.config.settle_window;
        let producer = async move {
            fetch_latest(
                transport.as_ref(),
                &sources,
                &query,
                hard_timeout,
                settle_window,
            )
            .await
        };

        let (result, led) = self.flights.fetch_or_join(key.clone(), producer).await;
        match result {
            Ok(Some(document)) => Ok(Some(self.apply_document(
                key,
                document,
                DocumentOrigin::Remote,
            ))),
            Ok(None) => Ok(None),
            Err(error) if led => {
                warn!(?key, %error, "fetch failed");
                Err(error)
            }
            Err(error) => {
                // Joiners degrade to whatever the cache still holds; the
                // leader already reported the failure.
                debug!(?key, %error, "joined fetch failed, serving cached value");
                Ok(self
                    .lock_cache()
                    .peek(&key)
                    .map(|cached| cached.document.clone()))
            }
        }
    }

    // ===== Aggregation =====

    /// Exhaustively query every configured source for `key`, reducing to a
    /// canonical document with full per-source provenance.
    ///
    /// The outcome is NOT applied to the cache; callers inspect it (and
    /// possibly confirm with the user) before [`apply_canonical`] and
    /// [`republish`](Self::republish).
    ///
    /// [`apply_canonical`]: Self::apply_canonical
    pub async fn aggregate(&self, key: &DocumentKey) -> Result<AggregationOutcome, SyncError> {
        let aggregator = self.aggregator();
        aggregator
            .run(
                &self.config.sources,
                &DocumentQuery::for_key(key),
                Some(self.session_tx.clone()),
            )
            .await
    }

    /// Accept an aggregation outcome: cache its canonical document.
    pub fn apply_canonical(&self, outcome: &AggregationOutcome) -> Option<Document> {
        let canonical = outcome.canonical.as_ref()?;
        Some(self.apply_document(canonical.key(), canonical.clone(), DocumentOrigin::Remote))
    }

    /// Resend `document` verbatim to the given stale sources.
    pub async fn republish(
        &self,
        document: &Document,
        stale: &[SourceId],
    ) -> Result<(), SyncError> {
        self.aggregator().republish(document, stale).await
    }

    fn aggregator(&self) -> Aggregator<T> {
        Aggregator::new(
            Arc::clone(&self.transport),
            self.config.per_source_timeout,
            self.config.batch_size,
            self.config.batch_stagger,
        )
    }

    // ===== Membership =====

    /// Stage a member addition locally, without touching the network.
    ///
    /// The resulting document is cached as optimistic state for immediate
    /// UI feedback; it never serves as the base of a later mutation.
    pub fn add_member_local(
        &self,
        key: &DocumentKey,
        member: AuthorId,
    ) -> Result<Document, SyncError> {
        self.stage_member_op(key, member, MemberOp::Add)
    }

    /// Stage a member removal locally, without touching the network.
    ///
    /// Fails with [`SyncError::AuthorityMissing`] when no document at `key`
    /// has ever been seen: removing from an unknown list could silently
    /// drop every other member once the guess is published.
    pub fn remove_member_local(
        &self,
        key: &DocumentKey,
        member: AuthorId,
    ) -> Result<Document, SyncError> {
        self.stage_member_op(key, member, MemberOp::Remove)
    }

    fn stage_member_op(
        &self,
        key: &DocumentKey,
        member: AuthorId,
        op: MemberOp,
    ) -> Result<Document, SyncError> {
        let base = {
            let cache = self.lock_cache();
            cache
                .peek(key)
                .and_then(|cached| cached.document.members().cloned())
        };
        let base = match (base, op) {
            (Some(members), _) => members,
            (None, MemberOp::Add) => Default::default(),
            (None, MemberOp::Remove) => return Err(SyncError::AuthorityMissing),
        };
        let members = apply_member_op(&base, op, &member);
        let document = self.signer.sign(DocumentDraft {
            author: key.author,
            kind: key.kind,
            discriminator: key.discriminator.clone(),
            created_at: Timestamp::now(),
            payload: DocumentPayload::Members { members },
        })?;
        Ok(self.apply_document(key.clone(), document, DocumentOrigin::Optimistic))
    }

    /// Publish a membership mutation to every configured source.
    ///
    /// The base is the freshest authoritative document at `key`: a cached
    /// remote/published entry owned by `key.author`, else a direct fetch
    /// from the sources. With no authoritative base anywhere, an addition
    /// starts from an empty set but a removal fails with
    /// [`SyncError::AuthorityMissing`] and leaves the cache untouched.
    pub async fn publish_membership(
        &self,
        key: &DocumentKey,
        member: AuthorId,
        op: MemberOp,
    ) -> Result<Document, SyncError> {
        let base_doc = match self.authoritative_base(key) {
            Some(document) => Some(document),
            None => self.fetch_base(key).await?,
        };

        let base = match &base_doc {
            Some(document) => document.members().cloned().unwrap_or_default(),
            None if op == MemberOp::Remove => return Err(SyncError::AuthorityMissing),
            None => Default::default(),
        };

        // An idempotent op leaves the set unchanged but still publishes a
        // freshly timestamped document.
        if !op.changes(&base, &member) {
            debug!(?key, ?op, "membership op already reflected in the base");
        }

        let members = apply_member_op(&base, op, &member);
        let document = self.signer.sign(DocumentDraft {
            author: key.author,
            kind: key.kind,
            discriminator: key.discriminator.clone(),
            created_at: Timestamp::now(),
            payload: DocumentPayload::Members { members },
        })?;

        self.transport
            .publish(&document, &self.config.sources)
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        debug!(id = %document.id, ?key, ?op, "membership published");

        Ok(self.apply_document(key.clone(), document, DocumentOrigin::Published))
    }

    /// The freshest cached document at `key` that is safe to mutate from:
    /// owned by the key's author and not an optimistic guess.
    fn authoritative_base(&self, key: &DocumentKey) -> Option<Document> {
        let cache = self.lock_cache();
        let cached = cache.peek(key)?;
        if cached.origin == DocumentOrigin::Optimistic || cached.document.author != key.author {
            return None;
        }
        Some(cached.document.clone())
    }

    /// Fetch a mutation base straight from the sources.
    ///
    /// The raw fetch result is used, never the cache-merged view: a
    /// staged optimistic entry carries a fresh wall-clock timestamp and
    /// would win the merge, leaking back in as its own base.
    async fn fetch_base(&self, key: &DocumentKey) -> Result<Option<Document>, SyncError> {
        let fetched = fetch_latest(
            self.transport.as_ref(),
            &self.config.sources,
            &DocumentQuery::for_key(key),
            self.config.hard_timeout,
            self.config.settle_window,
        )
        .await?;
        if let Some(document) = &fetched {
            self.apply_document(key.clone(), document.clone(), DocumentOrigin::Remote);
        }
        Ok(fetched.filter(|document| document.author == key.author))
    }

    // ===== Persistence =====

    /// Warm the cache from a persisted document snapshot.
    ///
    /// Absent or corrupt snapshots are treated identically: the cache
    /// starts empty. Loaded documents enter through the same latest-wins
    /// path as fetched ones, so a fresher live document is never
    /// displaced by a stale snapshot. Returns how many documents loaded.
    pub async fn warm_start(&self, persistence: &dyn Persistence) -> Result<usize, SyncError> {
        let documents = match persistence.load_blob(STORE_NAMESPACE, CACHE_KEY).await {
            Ok(Some(bytes)) => match rmp_serde::from_slice::<Vec<Document>>(&bytes) {
                Ok(documents) => documents,
                Err(error) => {
                    warn!(%error, "cache snapshot corrupt, starting cold");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(error) => {
                warn!(%error, "cache snapshot unreadable, starting cold");
                Vec::new()
            }
        };
        let count = documents.len();
        for document in documents {
            self.apply_document(document.key(), document, DocumentOrigin::Remote);
        }
        debug!(count, "cache warmed");
        Ok(count)
    }

    /// Persist the confirmed cache contents for a later [`warm_start`].
    ///
    /// Optimistic entries are skipped: they were never confirmed by any
    /// source and must not masquerade as remote state after a restart.
    ///
    /// [`warm_start`]: Self::warm_start
    pub async fn persist_cache(&self, persistence: &dyn Persistence) -> Result<(), SyncError> {
        let documents: Vec<Document> = {
            let cache = self.lock_cache();
            cache
                .values()
                .filter(|cached| cached.origin != DocumentOrigin::Optimistic)
                .map(|cached| cached.document.clone())
                .collect()
        };
        let bytes = rmp_serde::to_vec(&documents)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;
        persistence.save_blob(STORE_NAMESPACE, CACHE_KEY, bytes).await?;
        debug!(documents = documents.len(), "cache snapshot saved");
        Ok(())
    }

    // ===== Observation =====

    /// Observe documents as they are applied to the cache.
    pub fn observe_documents(&self) -> watch::Receiver<Option<Document>> {
        self.docs_tx.subscribe()
    }

    /// Observe progressive per-source snapshots of the running aggregation.
    pub fn observe_session(&self) -> watch::Receiver<AggregationSession> {
        self.session_tx.subscribe()
    }

    // ===== Cache management =====

    /// Drop the cached entry at `key`, forcing the next read to fetch.
    pub fn invalidate(&self, key: &DocumentKey) {
        self.lock_cache().invalidate(key);
    }

    /// Number of cached documents.
    pub fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }

    /// Drop all local state and disconnect from every source. Idempotent.
    pub async fn clear(&self) {
        self.lock_cache().invalidate_all();
        let _ = self.docs_tx.send(None);
        self.transport.disconnect_all().await;
        debug!("client cleared");
    }

    /// Cache a document if it wins against the incumbent at `key`, and
    /// return whichever document the cache now holds. A strictly newer
    /// document (or a re-apply of the incumbent itself) replaces; an equal
    /// timestamp keeps the incumbent, except that a confirmed document
    /// displaces an optimistic guess it ties.
    fn apply_document(
        &self,
        key: DocumentKey,
        document: Document,
        origin: DocumentOrigin,
    ) -> Document {
        let now = Instant::now().into_std();
        let mut cache = self.lock_cache();
        if let Some(cached) = cache.peek(&key) {
            let confirms_guess = cached.origin == DocumentOrigin::Optimistic
                && origin != DocumentOrigin::Optimistic
                && !cached.document.is_newer_than(&document);
            if cached.document.id != document.id
                && !document.is_newer_than(&cached.document)
                && !confirms_guess
            {
                return cached.document.clone();
            }
        }
        cache.put(
            key,
            CachedDocument {
                document: document.clone(),
                origin,
            },
            self.config.cache_ttl,
            now,
        );
        drop(cache);
        let _ = self.docs_tx.send(Some(document.clone()));
        document
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, TtlCache<DocumentKey, CachedDocument>> {
        // A poisoned cache lock only means a panic mid-operation; the
        // cache itself is still structurally sound.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}
