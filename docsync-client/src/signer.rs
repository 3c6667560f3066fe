//! Signing collaborator for locally authored documents.
//!
//! The engine never holds key material; a [`Signer`] turns a
//! [`DocumentDraft`] into an immutable [`Document`] by computing the
//! content-derived id and attaching a signature. Applications plug in
//! their real signer; [`MockSigner`] hashes but does not sign, and exists
//! for tests and local-only use.

use sha2::{Digest, Sha256};

use docsync_types::{Document, DocumentDraft, RecordId, SyncError};

/// Turns document drafts into signed documents.
pub trait Signer: Send + Sync {
    /// Sign a draft, producing the final immutable document.
    fn sign(&self, draft: DocumentDraft) -> Result<Document, SyncError>;
}

/// A signer that derives the id (SHA-256 of the canonical draft bytes)
/// but attaches only a placeholder signature.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockSigner;

impl MockSigner {
    /// Create a mock signer.
    pub fn new() -> Self {
        Self
    }
}

impl Signer for MockSigner {
    fn sign(&self, draft: DocumentDraft) -> Result<Document, SyncError> {
        let bytes = draft.signing_bytes()?;
        let digest = Sha256::digest(&bytes);
        let id = RecordId::from_bytes(&digest)
            .ok_or_else(|| SyncError::Signing("digest has unexpected length".to_string()))?;
        Ok(Document {
            id,
            author: draft.author,
            kind: draft.kind,
            discriminator: draft.discriminator,
            created_at: draft.created_at,
            payload: draft.payload,
            signature: digest.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_types::{AuthorId, DocumentKind, DocumentPayload, Timestamp};

    fn draft(author: AuthorId, created_at: u64) -> DocumentDraft {
        DocumentDraft {
            author,
            kind: DocumentKind::ContactList,
            discriminator: None,
            created_at: Timestamp::new(created_at),
            payload: DocumentPayload::Members {
                members: Default::default(),
            },
        }
    }

    #[test]
    fn id_is_content_derived_and_deterministic() {
        let author = AuthorId::random();
        let a = MockSigner::new().sign(draft(author, 100)).unwrap();
        let b = MockSigner::new().sign(draft(author, 100)).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn different_content_gets_different_ids() {
        let author = AuthorId::random();
        let a = MockSigner::new().sign(draft(author, 100)).unwrap();
        let b = MockSigner::new().sign(draft(author, 101)).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn signed_document_carries_draft_fields() {
        let author = AuthorId::random();
        let signed = MockSigner::new().sign(draft(author, 100)).unwrap();
        assert_eq!(signed.author, author);
        assert_eq!(signed.kind, DocumentKind::ContactList);
        assert_eq!(signed.created_at, Timestamp::new(100));
        assert!(!signed.signature.is_empty());
    }
}
