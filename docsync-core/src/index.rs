//! Append-only multi-index over attestation records.
//!
//! Indexes an unbounded stream of immutable records three ways: by id
//! (dedup), by scope, and by `(scope, target)` -> distinct attesting
//! authors. Insertion is idempotent on id. The index is bounded to the N
//! most recently arrived records; beyond the ceiling the oldest record is
//! silently dropped from every index.
//!
//! Rebuilding from a persisted snapshot replays records through the same
//! insert path, so incremental and cold-loaded indices are identical.

use std::collections::{BTreeSet, HashMap, VecDeque};

use docsync_types::{AttestationRecord, AuthorId, RecordId};

/// Bounded, three-way index over [`AttestationRecord`]s.
#[derive(Debug)]
pub struct AttestationIndex {
    ceiling: usize,
    /// Arrival order, oldest at the front.
    order: VecDeque<RecordId>,
    by_id: HashMap<RecordId, AttestationRecord>,
    by_scope: HashMap<String, Vec<RecordId>>,
    /// Author reference counts per (scope, target), so eviction keeps the
    /// distinct-attester sets exact.
    attesters: HashMap<(String, AuthorId), HashMap<AuthorId, usize>>,
}

impl AttestationIndex {
    /// Create an index bounded to `ceiling` records.
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.max(1),
            order: VecDeque::new(),
            by_id: HashMap::new(),
            by_scope: HashMap::new(),
            attesters: HashMap::new(),
        }
    }

    /// Rebuild an index by replaying `records` in order through insert.
    pub fn rebuild(ceiling: usize, records: impl IntoIterator<Item = AttestationRecord>) -> Self {
        let mut index = Self::new(ceiling);
        for record in records {
            index.insert(record);
        }
        index
    }

    /// Index a record. Returns `true` if the record was new, `false` if
    /// its id was already seen (a no-op).
    pub fn insert(&mut self, record: AttestationRecord) -> bool {
        if self.by_id.contains_key(&record.id) {
            return false;
        }
        if self.order.len() >= self.ceiling {
            self.evict_oldest();
        }

        self.order.push_back(record.id);
        self.by_scope
            .entry(record.scope.clone())
            .or_default()
            .push(record.id);
        if let Some(target) = record.target {
            *self
                .attesters
                .entry((record.scope.clone(), target))
                .or_default()
                .entry(record.author)
                .or_insert(0) += 1;
        }
        self.by_id.insert(record.id, record);
        true
    }

    fn evict_oldest(&mut self) {
        let oldest = match self.order.pop_front() {
            Some(id) => id,
            None => return,
        };
        let record = match self.by_id.remove(&oldest) {
            Some(record) => record,
            None => return,
        };

        if let Some(ids) = self.by_scope.get_mut(&record.scope) {
            ids.retain(|id| *id != oldest);
            if ids.is_empty() {
                self.by_scope.remove(&record.scope);
            }
        }
        if let Some(target) = record.target {
            let key = (record.scope.clone(), target);
            if let Some(counts) = self.attesters.get_mut(&key) {
                if let Some(count) = counts.get_mut(&record.author) {
                    *count -= 1;
                    if *count == 0 {
                        counts.remove(&record.author);
                    }
                }
                if counts.is_empty() {
                    self.attesters.remove(&key);
                }
            }
        }
    }

    /// Whether a record id has been indexed.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Look up a record by id.
    pub fn get(&self, id: &RecordId) -> Option<&AttestationRecord> {
        self.by_id.get(id)
    }

    /// All records in a scope, in arrival order.
    pub fn scope_records(&self, scope: &str) -> Vec<&AttestationRecord> {
        self.by_scope
            .get(scope)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// The distinct authors who attested about `target` within `scope`.
    pub fn attesters(&self, scope: &str, target: &AuthorId) -> BTreeSet<AuthorId> {
        self.attesters
            .get(&(scope.to_string(), *target))
            .map(|counts| counts.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of distinct attesting authors for `(scope, target)`.
    pub fn attester_count(&self, scope: &str, target: &AuthorId) -> usize {
        self.attesters
            .get(&(scope.to_string(), *target))
            .map(|counts| counts.len())
            .unwrap_or(0)
    }

    /// Snapshot of all records in arrival order (oldest first), suitable
    /// for persistence and later replay.
    pub fn snapshot(&self) -> Vec<AttestationRecord> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    /// Number of records currently indexed.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_types::Timestamp;

    fn record(author: AuthorId, scope: &str, target: Option<AuthorId>) -> AttestationRecord {
        AttestationRecord {
            id: RecordId::random(),
            author,
            scope: scope.to_string(),
            target,
            note: "spam".to_string(),
            observed_at: Timestamp::new(1),
        }
    }

    #[test]
    fn insert_is_idempotent_on_id() {
        let mut index = AttestationIndex::new(100);
        let target = AuthorId::random();
        let rec = record(AuthorId::random(), "scope", Some(target));

        assert!(index.insert(rec.clone()));
        assert!(!index.insert(rec));

        assert_eq!(index.len(), 1);
        assert_eq!(index.attester_count("scope", &target), 1);
        assert_eq!(index.scope_records("scope").len(), 1);
    }

    #[test]
    fn attesters_are_distinct_authors() {
        let mut index = AttestationIndex::new(100);
        let target = AuthorId::random();
        let a = AuthorId::random();
        let b = AuthorId::random();

        index.insert(record(a, "scope", Some(target)));
        index.insert(record(a, "scope", Some(target))); // same author again
        index.insert(record(b, "scope", Some(target)));

        assert_eq!(index.attester_count("scope", &target), 2);
        let attesters = index.attesters("scope", &target);
        assert!(attesters.contains(&a) && attesters.contains(&b));
    }

    #[test]
    fn scope_records_keep_arrival_order() {
        let mut index = AttestationIndex::new(100);
        let r1 = record(AuthorId::random(), "scope", None);
        let r2 = record(AuthorId::random(), "scope", None);
        let id1 = r1.id;
        let id2 = r2.id;

        index.insert(r1);
        index.insert(r2);
        index.insert(record(AuthorId::random(), "other", None));

        let records = index.scope_records("scope");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, id1);
        assert_eq!(records[1].id, id2);
    }

    #[test]
    fn ceiling_drops_oldest_from_every_index() {
        let mut index = AttestationIndex::new(2);
        let target = AuthorId::random();
        let a = AuthorId::random();
        let r1 = record(a, "scope", Some(target));
        let oldest_id = r1.id;

        index.insert(r1);
        index.insert(record(AuthorId::random(), "scope", Some(target)));
        index.insert(record(AuthorId::random(), "scope", Some(target)));

        assert_eq!(index.len(), 2);
        assert!(!index.contains(&oldest_id));
        assert_eq!(index.scope_records("scope").len(), 2);
        // Author `a` only appeared in the evicted record.
        assert!(!index.attesters("scope", &target).contains(&a));
        assert_eq!(index.attester_count("scope", &target), 2);
    }

    #[test]
    fn eviction_keeps_refcounted_attesters() {
        let mut index = AttestationIndex::new(2);
        let target = AuthorId::random();
        let a = AuthorId::random();

        // Two records by the same author; evicting one must not remove
        // the author while the other is still indexed.
        index.insert(record(a, "scope", Some(target)));
        index.insert(record(a, "scope", Some(target)));
        index.insert(record(AuthorId::random(), "scope", Some(target)));

        assert!(index.attesters("scope", &target).contains(&a));
        assert_eq!(index.attester_count("scope", &target), 2);
    }

    #[test]
    fn rebuild_equals_incremental() {
        let target = AuthorId::random();
        let records: Vec<_> = (0..5)
            .map(|_| record(AuthorId::random(), "scope", Some(target)))
            .collect();

        let mut incremental = AttestationIndex::new(3);
        for r in &records {
            incremental.insert(r.clone());
        }
        let rebuilt = AttestationIndex::rebuild(3, records);

        assert_eq!(incremental.len(), rebuilt.len());
        assert_eq!(
            incremental.snapshot(),
            rebuilt.snapshot()
        );
        assert_eq!(
            incremental.attesters("scope", &target),
            rebuilt.attesters("scope", &target)
        );
    }

    #[test]
    fn snapshot_replay_roundtrip() {
        let mut index = AttestationIndex::new(10);
        for _ in 0..4 {
            index.insert(record(AuthorId::random(), "scope", None));
        }

        let snapshot = index.snapshot();
        let replayed = AttestationIndex::rebuild(10, snapshot.clone());
        assert_eq!(replayed.snapshot(), snapshot);
    }
}
