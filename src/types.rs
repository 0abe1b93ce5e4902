//! Snapshot, edit, and identity types shared across the crate.
use crate::errors::ReconcileError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use uuid::Uuid;

/// Bound alias for the identifiers the diffing engine operates on.
///
/// Satisfied by anything hashable, comparable, clonable, and printable;
/// callers never implement it by hand.
pub trait Identifier: Clone + Eq + Hash + fmt::Debug {}

impl<T: Clone + Eq + Hash + fmt::Debug> Identifier for T {}

/// Location of one item: section offset plus item offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexPath {
    pub section: usize,
    pub item: usize,
}

impl IndexPath {
    pub fn new(section: usize, item: usize) -> Self {
        IndexPath { section, item }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.item)
    }
}

/// Opaque identity of one content update.
///
/// The hosting controller skips snapshot rebuilding entirely when the token
/// of the incoming payload equals the last applied token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpdateToken(Uuid);

impl UpdateToken {
    pub fn fresh() -> Self {
        UpdateToken(Uuid::new_v4())
    }
}

/// One ordered edit in a reconciliation plan.
///
/// Removals are emitted with descending offsets and precede inserts
/// (ascending offsets), matching the apply order of native diffable
/// engines. Item inserts carry the optional `before` anchor: the already
/// present item the new element lands in front of. When the anchor is
/// resolvable it is authoritative; the offset is used when no anchor exists
/// (append at the tail of the pending inserts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit<S, I> {
    InsertSection {
        offset: usize,
        section: S,
    },
    RemoveSection {
        offset: usize,
        section: S,
    },
    InsertItem {
        section: S,
        offset: usize,
        item: I,
        before: Option<I>,
    },
    RemoveItem {
        section: S,
        offset: usize,
        item: I,
    },
}

/// Outcome of differencing two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReconciliationPlan<S: Identifier, I: Identifier> {
    /// Identifier sequences are equal; the redraw path must not run.
    Unchanged,
    /// Ordered edits transforming the old snapshot into the new one.
    Incremental { edits: Vec<Edit<S, I>> },
    /// Incremental application is not viable; replace contents wholesale.
    Reset { snapshot: Snapshot<S, I> },
}

impl<S: Identifier, I: Identifier> ReconciliationPlan<S, I> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ReconciliationPlan::Unchanged)
    }
}

/// Ordered, identifier-keyed view of list content.
///
/// Sections keep insertion order and O(1) identifier lookup; each section
/// owns an ordered list of item identifiers. A snapshot never contains the
/// same section or item identifier twice. It is rebuilt per update and
/// mutated only through [`Snapshot::apply`] and the controller's
/// user-event paths.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<S: Identifier, I: Identifier> {
    sections: IndexMap<S, Vec<I>>,
}

impl<S: Identifier, I: Identifier> Default for Snapshot<S, I> {
    fn default() -> Self {
        Snapshot {
            sections: IndexMap::new(),
        }
    }
}

// IndexMap equality ignores order; snapshot equality is identifier
// *sequence* equality, so compare pairwise.
impl<S: Identifier, I: Identifier> PartialEq for Snapshot<S, I> {
    fn eq(&self, other: &Self) -> bool {
        self.sections.len() == other.sections.len()
            && self
                .sections
                .iter()
                .zip(other.sections.iter())
                .all(|((sa, ia), (sb, ib))| sa == sb && ia == ib)
    }
}

impl<S: Identifier, I: Identifier> Eq for Snapshot<S, I> {}

impl<S: Identifier, I: Identifier> Snapshot<S, I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from ordered `(section, items)` pairs, rejecting
    /// duplicate identifiers anywhere in the snapshot.
    pub fn from_sections<T>(sections: T) -> Result<Self, ReconcileError>
    where
        T: IntoIterator<Item = (S, Vec<I>)>,
    {
        let mut snapshot = Snapshot::new();
        for (section, items) in sections {
            if snapshot.sections.contains_key(&section) {
                return Err(ReconcileError::DuplicateSection {
                    id: format!("{section:?}"),
                });
            }
            let mut seen = HashSet::with_capacity(items.len());
            for item in &items {
                if !seen.insert(item) || snapshot.index_path_of(item).is_some() {
                    return Err(ReconcileError::DuplicateItem {
                        id: format!("{item:?}"),
                    });
                }
            }
            snapshot.sections.insert(section, items);
        }
        Ok(snapshot)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn number_of_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn number_of_items(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    pub fn section_ids(&self) -> impl Iterator<Item = &S> {
        self.sections.keys()
    }

    pub fn contains_section(&self, section: &S) -> bool {
        self.sections.contains_key(section)
    }

    pub fn index_of_section(&self, section: &S) -> Option<usize> {
        self.sections.get_index_of(section)
    }

    pub fn section_at(&self, offset: usize) -> Option<&S> {
        self.sections.get_index(offset).map(|(section, _)| section)
    }

    pub fn items(&self, section: &S) -> Option<&[I]> {
        self.sections.get(section).map(Vec::as_slice)
    }

    pub fn item_at(&self, path: IndexPath) -> Option<&I> {
        self.sections
            .get_index(path.section)
            .and_then(|(_, items)| items.get(path.item))
    }

    pub fn contains(&self, path: IndexPath) -> bool {
        self.item_at(path).is_some()
    }

    /// Linear scan; item identifiers are unique snapshot-wide, so the first
    /// hit is the only one.
    pub fn index_path_of(&self, item: &I) -> Option<IndexPath> {
        for (section_offset, (_, items)) in self.sections.iter().enumerate() {
            if let Some(item_offset) = items.iter().position(|i| i == item) {
                return Some(IndexPath::new(section_offset, item_offset));
            }
        }
        None
    }

    /// Applies an ordered edit sequence, validating every step against the
    /// current state. On error the snapshot is left as-is up to the failed
    /// edit; callers recover through the reset path.
    pub fn apply(&mut self, edits: &[Edit<S, I>]) -> Result<(), ReconcileError> {
        for edit in edits {
            self.apply_one(edit)?;
        }
        Ok(())
    }

    pub(crate) fn apply_one(&mut self, edit: &Edit<S, I>) -> Result<(), ReconcileError> {
        match edit {
            Edit::InsertSection { offset, section } => self.insert_section_at(*offset, section),
            Edit::RemoveSection { offset, section } => self.remove_section_at(*offset, section),
            Edit::InsertItem {
                section,
                offset,
                item,
                before,
            } => self.insert_item(section, *offset, item, before.as_ref()),
            Edit::RemoveItem {
                section,
                offset,
                item,
            } => self.remove_item_at(section, *offset, item),
        }
    }

    pub(crate) fn insert_section_at(
        &mut self,
        offset: usize,
        section: &S,
    ) -> Result<(), ReconcileError> {
        if self.sections.contains_key(section) {
            return Err(ReconcileError::DuplicateSection {
                id: format!("{section:?}"),
            });
        }
        if offset > self.sections.len() {
            return Err(ReconcileError::OffsetOutOfBounds {
                kind: "section insert",
                offset,
                len: self.sections.len(),
            });
        }
        self.sections.shift_insert(offset, section.clone(), Vec::new());
        Ok(())
    }

    pub(crate) fn remove_section_at(
        &mut self,
        offset: usize,
        expected: &S,
    ) -> Result<(), ReconcileError> {
        match self.sections.get_index(offset) {
            Some((section, _)) if section == expected => {
                self.sections.shift_remove_index(offset);
                Ok(())
            }
            Some((section, _)) => Err(ReconcileError::StateMismatch {
                details: format!("expected section {expected:?} at offset {offset}, found {section:?}"),
            }),
            None => Err(ReconcileError::OffsetOutOfBounds {
                kind: "section removal",
                offset,
                len: self.sections.len(),
            }),
        }
    }

    /// Anchored insert. When `before` is present it must currently sit in
    /// `section`; its position wins over `offset`. Without an anchor the
    /// item is placed at `offset`.
    pub(crate) fn insert_item(
        &mut self,
        section: &S,
        offset: usize,
        item: &I,
        before: Option<&I>,
    ) -> Result<(), ReconcileError> {
        if self.index_path_of(item).is_some() {
            return Err(ReconcileError::DuplicateItem {
                id: format!("{item:?}"),
            });
        }
        let section_offset =
            self.index_of_section(section)
                .ok_or_else(|| ReconcileError::UnknownSection {
                    id: format!("{section:?}"),
                })?;
        let position = match before {
            Some(anchor) => match self.index_path_of(anchor) {
                Some(path) if path.section == section_offset => path.item,
                _ => {
                    return Err(ReconcileError::AnchorOutOfSection {
                        anchor: format!("{anchor:?}"),
                        section: format!("{section:?}"),
                    });
                }
            },
            None => offset,
        };
        let items = &mut self.sections[section_offset];
        if position > items.len() {
            return Err(ReconcileError::OffsetOutOfBounds {
                kind: "item insert",
                offset: position,
                len: items.len(),
            });
        }
        items.insert(position, item.clone());
        Ok(())
    }

    pub(crate) fn remove_item_at(
        &mut self,
        section: &S,
        offset: usize,
        expected: &I,
    ) -> Result<(), ReconcileError> {
        let section_offset =
            self.index_of_section(section)
                .ok_or_else(|| ReconcileError::UnknownSection {
                    id: format!("{section:?}"),
                })?;
        let items = &mut self.sections[section_offset];
        match items.get(offset) {
            Some(item) if item == expected => {
                items.remove(offset);
                Ok(())
            }
            Some(item) => Err(ReconcileError::StateMismatch {
                details: format!("expected item {expected:?} at {offset}, found {item:?}"),
            }),
            None => Err(ReconcileError::OffsetOutOfBounds {
                kind: "item removal",
                offset,
                len: items.len(),
            }),
        }
    }

    /// Path-addressed removal used by the user-event glue.
    pub(crate) fn remove_at_path(&mut self, path: IndexPath) -> Option<I> {
        let (_, items) = self.sections.get_index_mut(path.section)?;
        if path.item < items.len() {
            Some(items.remove(path.item))
        } else {
            None
        }
    }

    /// Path-addressed insert used by the user-event glue. The item offset
    /// is clamped to the section length.
    pub(crate) fn insert_at_path(&mut self, path: IndexPath, item: I) -> Result<(), ReconcileError> {
        if self.index_path_of(&item).is_some() {
            return Err(ReconcileError::DuplicateItem {
                id: format!("{item:?}"),
            });
        }
        let len = self.sections.len();
        let (_, items) = self
            .sections
            .get_index_mut(path.section)
            .ok_or(ReconcileError::OffsetOutOfBounds {
                kind: "section index",
                offset: path.section,
                len,
            })?;
        let position = path.item.min(items.len());
        items.insert(position, item);
        Ok(())
    }
}
