//! Per-source aggregation state and latest-wins reduction.
//!
//! An [`AggregationSession`] tracks one query round against many sources.
//! Each source carries a status that starts [`SourceStatus::Pending`] and
//! moves to exactly one terminal state - transitions are monotonic, with
//! no back-transitions. Successful results are retained per source so
//! provenance (which source had which version) survives reduction.
//!
//! Reduction never touches any long-lived cache; it produces a value the
//! caller must explicitly apply.

use docsync_types::{Document, SourceId, Timestamp};

/// The query state of a single source within one aggregation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// Query issued, no answer yet.
    Pending,
    /// The source returned a document.
    Success,
    /// The source answered but had nothing matching.
    NoData,
    /// Transport error talking to the source.
    Failed,
    /// The per-source or per-batch deadline elapsed with no answer.
    Timeout,
}

impl SourceStatus {
    /// Terminal states are final for the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SourceStatus::Pending)
    }
}

/// One source's successful answer, retained distinctly from the reduced
/// canonical value.
#[derive(Debug, Clone)]
pub struct SourceResult {
    /// The source that answered.
    pub source: SourceId,
    /// The document it returned.
    pub document: Document,
    /// When the answer arrived.
    pub received_at: Timestamp,
}

/// State for one aggregation round over a fixed set of sources.
#[derive(Debug, Clone)]
pub struct AggregationSession {
    statuses: Vec<(SourceId, SourceStatus)>,
    results: Vec<SourceResult>,
}

impl AggregationSession {
    /// Start a session with every source pending.
    pub fn new(sources: &[SourceId]) -> Self {
        Self {
            statuses: sources
                .iter()
                .map(|s| (s.clone(), SourceStatus::Pending))
                .collect(),
            results: Vec::new(),
        }
    }

    /// Transition a source out of `Pending`. Returns `false` if the source
    /// is unknown or already terminal (terminal states are final).
    fn transition(&mut self, source: &SourceId, status: SourceStatus) -> bool {
        match self
            .statuses
            .iter_mut()
            .find(|(s, _)| s == source)
        {
            Some((_, current)) if !current.is_terminal() => {
                *current = status;
                true
            }
            _ => false,
        }
    }

    /// Record a document from a source.
    pub fn record_success(
        &mut self,
        source: &SourceId,
        document: Document,
        received_at: Timestamp,
    ) -> bool {
        if self.transition(source, SourceStatus::Success) {
            self.results.push(SourceResult {
                source: source.clone(),
                document,
                received_at,
            });
            true
        } else {
            false
        }
    }

    /// Record that a source answered with nothing matching.
    pub fn record_no_data(&mut self, source: &SourceId) -> bool {
        self.transition(source, SourceStatus::NoData)
    }

    /// Record a transport failure for a source.
    pub fn record_failure(&mut self, source: &SourceId) -> bool {
        self.transition(source, SourceStatus::Failed)
    }

    /// Record a deadline expiry for a source.
    pub fn record_timeout(&mut self, source: &SourceId) -> bool {
        self.transition(source, SourceStatus::Timeout)
    }

    /// Close the session: any source still pending is force-transitioned
    /// to `Timeout`.
    pub fn finish(&mut self) {
        for (_, status) in &mut self.statuses {
            if !status.is_terminal() {
                *status = SourceStatus::Timeout;
            }
        }
    }

    /// Per-source statuses in input order.
    pub fn statuses(&self) -> &[(SourceId, SourceStatus)] {
        &self.statuses
    }

    /// All successful results, in arrival order.
    pub fn results(&self) -> &[SourceResult] {
        &self.results
    }

    /// Whether every source has reached a terminal state.
    pub fn is_settled(&self) -> bool {
        self.statuses.iter().all(|(_, s)| s.is_terminal())
    }

    /// The canonical document: strictly greatest `created_at` over all
    /// successful results. Ties keep the earlier-arrived incumbent.
    pub fn canonical(&self) -> Option<&Document> {
        let mut best: Option<&Document> = None;
        for result in &self.results {
            match best {
                Some(current) if !result.document.is_newer_than(current) => {}
                _ => best = Some(&result.document),
            }
        }
        best
    }

    /// Sources whose returned document is strictly older than the
    /// canonical one - candidates for republish repair.
    pub fn stale_sources(&self) -> Vec<SourceId> {
        let canonical = match self.canonical() {
            Some(doc) => doc,
            None => return Vec::new(),
        };
        self.results
            .iter()
            .filter(|r| canonical.is_newer_than(&r.document))
            .map(|r| r.source.clone())
            .collect()
    }
}
