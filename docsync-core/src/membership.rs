//! Idempotent member-set diffing for membership documents.
//!
//! Mutating a membership list means constructing a brand-new document with
//! an updated member set; this module computes the updated set. Adding an
//! already-present member or removing an absent one yields the same set
//! back, so repeated application is harmless.

use docsync_types::AuthorId;
use std::collections::BTreeSet;

/// A membership mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOp {
    /// Add a member to the set.
    Add,
    /// Remove a member from the set.
    Remove,
}

impl MemberOp {
    /// Whether applying this op to `base` would change the set.
    pub fn changes(&self, base: &BTreeSet<AuthorId>, member: &AuthorId) -> bool {
        match self {
            MemberOp::Add => !base.contains(member),
            MemberOp::Remove => base.contains(member),
        }
    }
}

/// Compute the member set that results from applying `op` to `base`.
pub fn apply_member_op(
    base: &BTreeSet<AuthorId>,
    op: MemberOp,
    member: &AuthorId,
) -> BTreeSet<AuthorId> {
    let mut updated = base.clone();
    match op {
        MemberOp::Add => {
            updated.insert(*member);
        }
        MemberOp::Remove => {
            updated.remove(member);
        }
    }
    updated
}
