//! # docsync-client
//!
//! Async engine for syncing replaceable documents across untrusted,
//! partially-available sources.
//!
//! This is the library applications embed to read and publish documents.
//!
//! ## Features
//!
//! - **Cache-First Reads**: bounded TTL/LRU cache in front of every fetch
//! - **Coalesced Fetches**: concurrent requests for one key share a flight
//! - **Race With Settle**: first answer wins after a short beat-me window
//! - **Exhaustive Aggregation**: per-source provenance and stale repair
//! - **Transport Abstraction**: pluggable source layer (mock included)
//!
//! ## Example
//!
//! ```ignore
//! use docsync_client::{DocSyncClient, SyncConfig};
//!
//! let config = SyncConfig::new(sources);
//! let client = DocSyncClient::new(config, transport, signer);
//!
//! // Cache-first read of the latest contact list.
//! let document = client.document(&key).await?;
//!
//! // Exhaustive round with provenance, then repair stale sources.
//! let outcome = client.aggregate(&key).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod client;
pub mod config;
pub mod fanout;
pub mod fetch;
pub mod signer;
pub mod singleflight;
pub mod store;
pub mod transport;

pub use aggregate::{AggregationOutcome, Aggregator};
pub use client::{CachedDocument, DocSyncClient, DocumentOrigin};
pub use config::SyncConfig;
pub use fetch::fetch_latest;
pub use signer::{MockSigner, Signer};
pub use singleflight::SingleFlight;
pub use store::{AttestationStore, MemoryPersistence, Persistence};
pub use transport::{
    MockTransport, SourceEvent, Subscription, SubscriptionHandle, Transport, TransportError,
};
