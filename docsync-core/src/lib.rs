//! # docsync-core
//!
//! Pure logic for the docsync engine - no I/O, instant tests.
//!
//! Everything here is deterministic: time enters as a parameter, never from
//! a clock, and the caller (docsync-client) performs all network and disk
//! access. The modules:
//! - [`cache`] - bounded TTL/LRU key-value store
//! - [`session`] - per-source aggregation state and latest-wins reduction
//! - [`membership`] - idempotent member-set diffing
//! - [`index`] - append-only multi-index over attestation records

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod index;
pub mod membership;
pub mod session;

pub use cache::TtlCache;
pub use index::AttestationIndex;
pub use membership::{apply_member_op, MemberOp};
pub use session::{AggregationSession, SourceResult, SourceStatus};
