//! # docsync-types
//!
//! Shared types for the docsync multi-source document synchronization engine:
//! - [`AuthorId`], [`SourceId`], [`RecordId`], [`Timestamp`] - Identity and ordering types
//! - [`Document`], [`DocumentKey`], [`DocumentQuery`] - Versioned, author-owned documents
//! - [`AttestationRecord`] - Immutable append-only observations
//! - [`SyncError`] - Error taxonomy shared across the engine

#![warn(missing_docs)]
#![warn(clippy::all)]

mod attestation;
mod document;
mod error;
mod ids;

pub use attestation::AttestationRecord;
pub use document::{
    Document, DocumentDraft, DocumentKey, DocumentKind, DocumentPayload, DocumentQuery,
    SourceEntry,
};
pub use error::SyncError;
pub use ids::{AuthorId, RecordId, SourceId, Timestamp};
