use crate::{key::KeyPart, store::Versionstamp};

/// Identity of a document inside its collection; any valid key part.
pub type DocumentId = KeyPart;

///
/// Document
///
/// A materialized document: identity, the versionstamp of its id-entry, and
/// the decoded value.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Document<T> {
    pub id: DocumentId,
    pub versionstamp: Versionstamp,
    pub value: T,
}

///
/// CommitResult
///
/// Document-level write outcome. `Conflict` covers failed version checks and
/// duplicate primary-index values alike; the store reports no distinction.
///

#[derive(Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum CommitResult {
    Committed {
        id: DocumentId,
        versionstamp: Versionstamp,
    },
    Conflict,
}

impl CommitResult {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    #[must_use]
    pub const fn id(&self) -> Option<&DocumentId> {
        match self {
            Self::Committed { id, .. } => Some(id),
            Self::Conflict => None,
        }
    }

    #[must_use]
    pub const fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            Self::Committed { versionstamp, .. } => Some(*versionstamp),
            Self::Conflict => None,
        }
    }
}
