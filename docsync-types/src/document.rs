//! Versioned, author-owned documents and the queries that match them.
//!
//! A [`Document`] is a small, replaceable value identified by a
//! [`DocumentKey`] (author + kind + optional discriminator). Later documents
//! for the same key replace earlier ones by strictly greater `created_at`.
//! Payloads are a closed set of typed variants; nothing downstream inspects
//! raw untyped data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{AuthorId, RecordId, SourceId, SyncError, Timestamp};

/// The closed set of document kinds the engine synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// An author's contact list (set of followed authors).
    ContactList,
    /// An author's advertised source list (read/write source metadata).
    SourceDirectory,
    /// A named subscription list; the name travels in the key discriminator.
    Subscriptions,
    /// A moderation attestation (flag/report made by one author).
    ModerationRecord,
    /// A referenced note (free-form text addressed by discriminator).
    Note,
}

/// One source entry in a [`DocumentPayload::Sources`] document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// The source address.
    pub url: SourceId,
    /// Whether the author reads from this source.
    pub read: bool,
    /// Whether the author writes to this source.
    pub write: bool,
}

/// Typed document payloads, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentPayload {
    /// A set of member authors (contact and subscription lists).
    Members {
        /// The member set; ordering is irrelevant.
        members: BTreeSet<AuthorId>,
    },
    /// A source directory.
    Sources {
        /// Advertised sources with read/write flags.
        sources: Vec<SourceEntry>,
    },
    /// A moderation attestation about a target within a scope.
    Attestation {
        /// The scope the attestation belongs to (e.g. a thread or community key).
        scope: String,
        /// The author being attested about, if any.
        target: Option<AuthorId>,
        /// Free-form reason/label.
        note: String,
    },
    /// Free-form text (referenced notes).
    Text {
        /// The note body.
        text: String,
    },
}

/// Identifies one logical, replaceable document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    /// The owning author.
    pub author: AuthorId,
    /// The document kind.
    pub kind: DocumentKind,
    /// Distinguishes multiple documents of the same kind (e.g. list names).
    pub discriminator: Option<String>,
}

impl DocumentKey {
    /// Create a key with no discriminator.
    pub fn new(author: AuthorId, kind: DocumentKind) -> Self {
        Self {
            author,
            kind,
            discriminator: None,
        }
    }

    /// Set the discriminator.
    pub fn with_discriminator(mut self, discriminator: &str) -> Self {
        self.discriminator = Some(discriminator.to_string());
        self
    }
}

/// An unsigned document, ready to be signed.
///
/// The signing collaborator turns a draft into a [`Document`] by computing
/// the content-derived id and attaching a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    /// The owning author.
    pub author: AuthorId,
    /// The document kind.
    pub kind: DocumentKind,
    /// Key discriminator, if any.
    pub discriminator: Option<String>,
    /// Creation time; replacement ordering is by this field.
    pub created_at: Timestamp,
    /// The typed payload.
    pub payload: DocumentPayload,
}

impl DocumentDraft {
    /// Canonical bytes the signer hashes and signs (MessagePack).
    pub fn signing_bytes(&self) -> Result<Vec<u8>, SyncError> {
        rmp_serde::to_vec(self).map_err(|e| SyncError::Serialization(e.to_string()))
    }
}

/// A signed, immutable document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Content-derived id.
    pub id: RecordId,
    /// The owning author.
    pub author: AuthorId,
    /// The document kind.
    pub kind: DocumentKind,
    /// Key discriminator, if any.
    pub discriminator: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// The typed payload.
    pub payload: DocumentPayload,
    /// Signature over [`DocumentDraft::signing_bytes`].
    pub signature: Vec<u8>,
}

impl Document {
    /// The key this document replaces.
    pub fn key(&self) -> DocumentKey {
        DocumentKey {
            author: self.author,
            kind: self.kind,
            discriminator: self.discriminator.clone(),
        }
    }

    /// Whether this document replaces `other` at the same key.
    ///
    /// Strictly greater `created_at`; an equal timestamp never replaces
    /// the incumbent.
    pub fn is_newer_than(&self, other: &Document) -> bool {
        self.created_at > other.created_at
    }

    /// The member set, if this is a membership document.
    pub fn members(&self) -> Option<&BTreeSet<AuthorId>> {
        match &self.payload {
            DocumentPayload::Members { members } => Some(members),
            _ => None,
        }
    }

    /// Serialize to MessagePack bytes (the transport boundary encoding).
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        rmp_serde::to_vec(self).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        rmp_serde::from_slice(bytes).map_err(|e| SyncError::Decode(e.to_string()))
    }
}

/// A query for documents, matched against already-decoded documents.
///
/// Empty `authors`/`kinds` lists are wildcards. A `discriminator` of `None`
/// matches any discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DocumentQuery {
    /// Authors to match (empty = any).
    pub authors: Vec<AuthorId>,
    /// Kinds to match (empty = any).
    pub kinds: Vec<DocumentKind>,
    /// Exact discriminator to match (`None` = any).
    pub discriminator: Option<String>,
}

impl DocumentQuery {
    /// The query that matches exactly one document key.
    pub fn for_key(key: &DocumentKey) -> Self {
        Self {
            authors: vec![key.author],
            kinds: vec![key.kind],
            discriminator: key.discriminator.clone(),
        }
    }

    /// Whether `document` matches this query.
    pub fn matches(&self, document: &Document) -> bool {
        if !self.authors.is_empty() && !self.authors.contains(&document.author) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&document.kind) {
            return false;
        }
        if let Some(disc) = &self.discriminator {
            if document.discriminator.as_deref() != Some(disc.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn newer_than_is_strict() {
        let author = AuthorId::random();
        let d1 = members_doc(author, 100, &[]);
        let d2 = members_doc(author, 200, &[]);
        let d3 = members_doc(author, 100, &[]);

        assert!(d2.is_newer_than(&d1));
        assert!(!d1.is_newer_than(&d2));
        // Equal timestamps never replace the incumbent.
        assert!(!d3.is_newer_than(&d1));
        assert!(!d1.is_newer_than(&d3));
    }

    #[test]
    fn document_roundtrips_through_bytes() {
        let doc = members_doc(AuthorId::random(), 42, &[AuthorId::random()]);
        let bytes = doc.to_bytes().unwrap();
        let restored = Document::from_bytes(&bytes).unwrap();
        assert_eq!(doc, restored);
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        let result = Document::from_bytes(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(SyncError::Decode(_))));
    }

    #[test]
    fn source_directory_roundtrips_through_bytes() {
        let doc = Document {
            id: RecordId::random(),
            author: AuthorId::random(),
            kind: DocumentKind::SourceDirectory,
            discriminator: None,
            created_at: Timestamp::new(42),
            payload: DocumentPayload::Sources {
                sources: vec![
                    SourceEntry {
                        url: SourceId::new("wss://a.example"),
                        read: true,
                        write: true,
                    },
                    SourceEntry {
                        url: SourceId::new("wss://b.example"),
                        read: true,
                        write: false,
                    },
                ],
            },
            signature: vec![],
        };
        let restored = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(doc, restored);
        assert!(restored.members().is_none());
    }

    #[test]
    fn key_includes_discriminator() {
        let author = AuthorId::random();
        let a = DocumentKey::new(author, DocumentKind::Subscriptions).with_discriminator("music");
        let b = DocumentKey::new(author, DocumentKind::Subscriptions).with_discriminator("books");
        assert_ne!(a, b);
    }

    #[test]
    fn query_for_key_matches_only_that_key() {
        let author = AuthorId::random();
        let doc = members_doc(author, 100, &[]);
        let query = DocumentQuery::for_key(&doc.key());

        assert!(query.matches(&doc));

        let other = members_doc(AuthorId::random(), 100, &[]);
        assert!(!query.matches(&other));
    }

    #[test]
    fn empty_query_is_wildcard() {
        let query = DocumentQuery::default();
        let doc = members_doc(AuthorId::random(), 1, &[]);
        assert!(query.matches(&doc));
    }

    #[test]
    fn query_discriminator_must_match_exactly() {
        let author = AuthorId::random();
        let mut doc = members_doc(author, 100, &[]);
        doc.kind = DocumentKind::Subscriptions;
        doc.discriminator = Some("music".to_string());

        let key = DocumentKey::new(author, DocumentKind::Subscriptions).with_discriminator("music");
        assert!(DocumentQuery::for_key(&key).matches(&doc));

        let wrong = DocumentKey::new(author, DocumentKind::Subscriptions).with_discriminator("books");
        assert!(!DocumentQuery::for_key(&wrong).matches(&doc));
    }

    #[test]
    fn payload_serializes_with_variant_tag() {
        let payload = DocumentPayload::Text {
            text: "hello".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("Text").is_some());
    }

    #[test]
    fn signing_bytes_are_deterministic() {
        let draft = DocumentDraft {
            author: AuthorId::from_bytes(&[7u8; 32]).unwrap(),
            kind: DocumentKind::ContactList,
            discriminator: None,
            created_at: Timestamp::new(1000),
            payload: DocumentPayload::Members {
                members: BTreeSet::new(),
            },
        };
        assert_eq!(
            draft.signing_bytes().unwrap(),
            draft.clone().signing_bytes().unwrap()
        );
    }
}
