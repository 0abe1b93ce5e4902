//! Error taxonomy for snapshot reconciliation.
//!
//! None of these errors cross the crate boundary to the consuming framework:
//! the hosting controller absorbs every one of them through the full-reset
//! fallback. They exist so the fallback decision is typed and testable.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("duplicate section identifier {id} within one snapshot")]
    DuplicateSection { id: String },

    #[error("duplicate item identifier {id} within one snapshot")]
    DuplicateItem { id: String },

    #[error("section {id} is not present in the snapshot")]
    UnknownSection { id: String },

    #[error("insert anchor {anchor} does not belong to section {section}")]
    AnchorOutOfSection { anchor: String, section: String },

    #[error("{kind} offset {offset} out of bounds for length {len}")]
    OffsetOutOfBounds {
        kind: &'static str,
        offset: usize,
        len: usize,
    },

    #[error("edit does not match snapshot state: {details}")]
    StateMismatch { details: String },
}
