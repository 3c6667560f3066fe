//! Append-only attestation records.

use serde::{Deserialize, Serialize};

use crate::{AuthorId, Document, DocumentPayload, RecordId, Timestamp};

/// An immutable observation (flag/report) contributed by one author about
/// one target within a scope.
///
/// Records are globally unique by `id`; re-delivery of the same id (e.g.
/// from a second source) is a no-op at the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    /// Globally unique record id.
    pub id: RecordId,
    /// The attesting author.
    pub author: AuthorId,
    /// The scope the attestation belongs to.
    pub scope: String,
    /// The author being attested about, if any.
    pub target: Option<AuthorId>,
    /// Free-form reason/label.
    pub note: String,
    /// When the attestation was made.
    pub observed_at: Timestamp,
}

impl AttestationRecord {
    /// Extract an attestation from a moderation document.
    ///
    /// Returns `None` for documents whose payload is not an attestation.
    pub fn from_document(document: &Document) -> Option<Self> {
        match &document.payload {
            DocumentPayload::Attestation {
                scope,
                target,
                note,
            } => Some(Self {
                id: document.id,
                author: document.author,
                scope: scope.clone(),
                target: *target,
                note: note.clone(),
                observed_at: document.created_at,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocumentKind;

    #[test]
    fn from_attestation_document() {
        let author = AuthorId::random();
        let target = AuthorId::random();
        let doc = Document {
            id: RecordId::random(),
            author,
            kind: DocumentKind::ModerationRecord,
            discriminator: None,
            created_at: Timestamp::new(500),
            payload: DocumentPayload::Attestation {
                scope: "thread-1".to_string(),
                target: Some(target),
                note: "spam".to_string(),
            },
            signature: vec![],
        };

        let record = AttestationRecord::from_document(&doc).unwrap();
        assert_eq!(record.id, doc.id);
        assert_eq!(record.author, author);
        assert_eq!(record.scope, "thread-1");
        assert_eq!(record.target, Some(target));
        assert_eq!(record.observed_at, Timestamp::new(500));
    }

    #[test]
    fn from_other_payload_is_none() {
        let doc = Document {
            id: RecordId::random(),
            author: AuthorId::random(),
            kind: DocumentKind::Note,
            discriminator: None,
            created_at: Timestamp::new(1),
            payload: DocumentPayload::Text {
                text: "not an attestation".to_string(),
            },
            signature: vec![],
        };
        assert!(AttestationRecord::from_document(&doc).is_none());
    }
}
