//! Error taxonomy for docsync.

use thiserror::Error;

/// Errors that can occur in docsync operations.
///
/// Per-source failures never abort a multi-source session; they are
/// recorded as statuses and the session proceeds with whatever succeeded.
/// Nothing here is fatal to the process.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// An empty source list was supplied; no network activity occurred.
    #[error("no sources supplied")]
    NoSources,

    /// No usable response arrived within the configured window.
    #[error("operation timed out")]
    Timeout,

    /// A connection/protocol error from the transport.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response could not be interpreted as the expected document type.
    /// Treated identically to no response from that source.
    #[error("could not decode document: {0}")]
    Decode(String),

    /// A mutation (particularly a removal) has no authoritative base to
    /// diff against.
    #[error("no authoritative document to diff against")]
    AuthorityMissing,

    /// MessagePack serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The persistence collaborator failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The signing collaborator failed.
    #[error("signing failed: {0}")]
    Signing(String),
}
