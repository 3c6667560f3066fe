//! Append-only attestation store with debounced persistence.
//!
//! Unlike the request/response fetch paths, the store consumes a
//! continuous push stream of moderation documents, maintains the
//! in-memory multi-index, and coalesces bursts of new records into a
//! single persisted snapshot after a short delay. On restart, the
//! persisted record list is replayed through the same index path, so a
//! cold load produces exactly the state incremental ingestion would have.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

use docsync_core::index::AttestationIndex;
use docsync_types::{AttestationRecord, AuthorId, SyncError};

use crate::transport::SourceEvent;

/// Namespace used for the store's persisted blob.
pub const STORE_NAMESPACE: &str = "docsync";
/// Key used for the store's persisted blob.
pub const STORE_KEY: &str = "attestations";

/// The on-device persistence collaborator.
///
/// Absence and corruption are treated identically by callers: fall back
/// to empty state.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Load a blob, `Ok(None)` if absent.
    async fn load_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, SyncError>;

    /// Save a blob, replacing any previous value.
    async fn save_blob(&self, namespace: &str, key: &str, bytes: Vec<u8>) -> Result<(), SyncError>;
}

/// In-memory persistence for testing.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    blobs: std::sync::Mutex<HashMap<(String, String), Vec<u8>>>,
    saves: std::sync::atomic::AtomicUsize,
}

impl MemoryPersistence {
    /// Create an empty in-memory persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saves performed (for debounce verification).
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Pre-load a blob (for cold-start tests).
    pub fn preload(&self, namespace: &str, key: &str, bytes: Vec<u8>) {
        let mut blobs = self.blobs.lock().unwrap();
        blobs.insert((namespace.to_string(), key.to_string()), bytes);
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn load_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, SyncError> {
        let blobs = self.blobs.lock().unwrap();
        Ok(blobs.get(&(namespace.to_string(), key.to_string())).cloned())
    }

    async fn save_blob(&self, namespace: &str, key: &str, bytes: Vec<u8>) -> Result<(), SyncError> {
        let mut blobs = self.blobs.lock().unwrap();
        blobs.insert((namespace.to_string(), key.to_string()), bytes);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Append-only attestation store.
pub struct AttestationStore {
    index: Arc<Mutex<AttestationIndex>>,
    persistence: Arc<dyn Persistence>,
    debounce: Duration,
    save_pending: Arc<AtomicBool>,
    count_tx: watch::Sender<usize>,
}

impl AttestationStore {
    /// Create a store bounded to `ceiling` records, persisting at most
    /// once per `debounce` window.
    pub fn new(persistence: Arc<dyn Persistence>, ceiling: usize, debounce: Duration) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            index: Arc::new(Mutex::new(AttestationIndex::new(ceiling))),
            persistence,
            debounce,
            save_pending: Arc::new(AtomicBool::new(false)),
            count_tx,
        }
    }

    /// Rebuild the index from the persisted blob, replaying records
    /// through the same insert path used for live ingestion. Absent or
    /// corrupt blobs yield an empty store.
    pub async fn load(&self) -> Result<usize, SyncError> {
        let records = match self.persistence.load_blob(STORE_NAMESPACE, STORE_KEY).await {
            Ok(Some(bytes)) => match rmp_serde::from_slice::<Vec<AttestationRecord>>(&bytes) {
                Ok(records) => records,
                Err(error) => {
                    warn!(%error, "attestation snapshot corrupt, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(error) => {
                warn!(%error, "attestation snapshot unreadable, starting empty");
                Vec::new()
            }
        };

        let mut index = self.index.lock().await;
        for record in records {
            index.insert(record);
        }
        let count = index.len();
        let _ = self.count_tx.send(count);
        debug!(count, "attestation store loaded");
        Ok(count)
    }

    /// Index a record. Returns `true` if it was new; a re-delivered id is
    /// a no-op and schedules no save.
    pub async fn ingest(&self, record: AttestationRecord) -> bool {
        let is_new = {
            let mut index = self.index.lock().await;
            let is_new = index.insert(record);
            if is_new {
                let _ = self.count_tx.send(index.len());
            }
            is_new
        };
        if is_new {
            self.schedule_save();
        }
        is_new
    }

    /// Consume a push stream of moderation documents until it closes.
    pub async fn run(&self, mut events: mpsc::Receiver<SourceEvent>) {
        while let Some(event) = events.recv().await {
            if let SourceEvent::Document { document, .. } = event {
                match AttestationRecord::from_document(&document) {
                    Some(record) => {
                        self.ingest(record).await;
                    }
                    None => {
                        debug!(id = %document.id, "push document without attestation payload");
                    }
                }
            }
        }
    }

    /// Schedule a debounced save unless one is already pending; bursts of
    /// records coalesce into a single write after the delay.
    fn schedule_save(&self) {
        if self.save_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let index = Arc::clone(&self.index);
        let persistence = Arc::clone(&self.persistence);
        let save_pending = Arc::clone(&self.save_pending);
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // Clear the flag before snapshotting: records arriving after
            // the snapshot schedule their own save.
            save_pending.store(false, Ordering::SeqCst);
            let snapshot = index.lock().await.snapshot();
            let bytes = match rmp_serde::to_vec(&snapshot) {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(%error, "attestation snapshot encode failed");
                    return;
                }
            };
            match persistence.save_blob(STORE_NAMESPACE, STORE_KEY, bytes).await {
                Ok(()) => debug!(records = snapshot.len(), "attestation snapshot saved"),
                Err(error) => warn!(%error, "attestation snapshot save failed"),
            }
        });
    }

    /// Observe the total indexed-record count.
    pub fn observe_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Number of records currently indexed.
    pub async fn len(&self) -> usize {
        self.index.lock().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.index.lock().await.is_empty()
    }

    /// All records in `scope`, in arrival order.
    pub async fn records_in_scope(&self, scope: &str) -> Vec<AttestationRecord> {
        self.index
            .lock()
            .await
            .scope_records(scope)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Number of distinct authors who attested about `target` in `scope`.
    pub async fn attester_count(&self, scope: &str, target: &AuthorId) -> usize {
        self.index.lock().await.attester_count(scope, target)
    }
}
