//! Bidirectional conversion between caller models and diff-stable identifiers.
//!
//! The map is built once per reconciliation from the payload content and the
//! caller's resolver functions, caching both directions. That makes repeated
//! lookups referentially consistent within one update cycle by construction,
//! and scopes the conversion cache to the hosting component instead of
//! process-wide state.
use crate::data_source::SectionModel;
use crate::errors::ReconcileError;
use crate::types::{Identifier, Snapshot};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Caller-supplied mapping from model values to stable identifiers.
///
/// Both functions must be pure: calling them twice on the same logical model
/// during one reconciliation must yield the same identifier.
pub struct IdentityResolver<S, I, SID, IID> {
    section_id: Box<dyn Fn(&S) -> SID>,
    item_id: Box<dyn Fn(&I) -> IID>,
}

impl<S, I, SID, IID> std::fmt::Debug for IdentityResolver<S, I, SID, IID> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver").finish_non_exhaustive()
    }
}

impl<S, I, SID, IID> IdentityResolver<S, I, SID, IID> {
    pub fn new(
        section_id: impl Fn(&S) -> SID + 'static,
        item_id: impl Fn(&I) -> IID + 'static,
    ) -> Self {
        IdentityResolver {
            section_id: Box::new(section_id),
            item_id: Box::new(item_id),
        }
    }

    pub fn section_id(&self, section: &S) -> SID {
        (self.section_id)(section)
    }

    pub fn item_id(&self, item: &I) -> IID {
        (self.item_id)(item)
    }
}

/// Identifier-keyed index over one payload's content, valid for one update
/// cycle.
#[derive(Debug)]
pub struct IdentifierMap<'r, S, I, SID: Identifier, IID: Identifier> {
    resolver: &'r IdentityResolver<S, I, SID, IID>,
    sections: IndexMap<SID, S>,
    items: HashMap<IID, I>,
    snapshot: Snapshot<SID, IID>,
}

impl<'r, S: Clone, I: Clone, SID: Identifier, IID: Identifier> IdentifierMap<'r, S, I, SID, IID> {
    /// Indexes `content`, rejecting identifier collisions anywhere in the
    /// snapshot. The mapping must be injective; a collision here is a
    /// caller-side programmer error that the controller downgrades to a
    /// full reset.
    pub fn index(
        content: &[SectionModel<S, I>],
        resolver: &'r IdentityResolver<S, I, SID, IID>,
    ) -> Result<Self, ReconcileError> {
        let mut sections = IndexMap::with_capacity(content.len());
        let mut items = HashMap::new();
        let mut ordered = Vec::with_capacity(content.len());

        for section_model in content {
            let section_id = resolver.section_id(&section_model.section);
            if sections
                .insert(section_id.clone(), section_model.section.clone())
                .is_some()
            {
                return Err(ReconcileError::DuplicateSection {
                    id: format!("{section_id:?}"),
                });
            }
            let mut item_ids = Vec::with_capacity(section_model.items.len());
            for item in &section_model.items {
                let item_id = resolver.item_id(item);
                if items.insert(item_id.clone(), item.clone()).is_some() {
                    return Err(ReconcileError::DuplicateItem {
                        id: format!("{item_id:?}"),
                    });
                }
                item_ids.push(item_id);
            }
            ordered.push((section_id, item_ids));
        }

        let snapshot = Snapshot::from_sections(ordered)?;
        Ok(IdentifierMap {
            resolver,
            sections,
            items,
            snapshot,
        })
    }

    pub fn section_id(&self, section: &S) -> SID {
        self.resolver.section_id(section)
    }

    pub fn item_id(&self, item: &I) -> IID {
        self.resolver.item_id(item)
    }

    pub fn section(&self, id: &SID) -> Option<&S> {
        self.sections.get(id)
    }

    pub fn item(&self, id: &IID) -> Option<&I> {
        self.items.get(id)
    }

    pub fn snapshot(&self) -> &Snapshot<SID, IID> {
        &self.snapshot
    }
}

/// Best-effort snapshot for the duplicate-identifier fallback: the first
/// occurrence of a colliding identifier wins, later ones are dropped. Never
/// partial, always internally consistent.
pub(crate) fn lossy_snapshot<S, I, SID: Identifier, IID: Identifier>(
    content: &[SectionModel<S, I>],
    resolver: &IdentityResolver<S, I, SID, IID>,
) -> Snapshot<SID, IID> {
    let mut snapshot: Snapshot<SID, IID> = Snapshot::new();
    for section_model in content {
        let section_id = resolver.section_id(&section_model.section);
        let offset = snapshot.number_of_sections();
        if snapshot.insert_section_at(offset, &section_id).is_err() {
            log::warn!("dropping duplicate section {section_id:?} during reset");
            continue;
        }
        for item in &section_model.items {
            let item_id = resolver.item_id(item);
            let items_len = snapshot.items(&section_id).map_or(0, <[IID]>::len);
            if snapshot
                .insert_item(&section_id, items_len, &item_id, None)
                .is_err()
            {
                log::warn!("dropping duplicate item {item_id:?} during reset");
            }
        }
    }
    snapshot
}
