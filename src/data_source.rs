//! The two ways list content reaches the bridge.
//!
//! Either the host hands over an immutable collection of section/item models
//! and the bridge diffs, or it hands over a handle to an externally managed
//! diffable store. In the external case the bridge is a passive observer: it
//! never diffs independently and binds the store's already-reconciled state
//! directly.
use crate::identifier_map::IdentityResolver;
use crate::types::{Edit, Identifier, IndexPath, Snapshot, UpdateToken};

/// One section model paired with its ordered item models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionModel<S, I> {
    pub section: S,
    pub items: Vec<I>,
}

impl<S, I> SectionModel<S, I> {
    pub fn new(section: S, items: Vec<I>) -> Self {
        SectionModel { section, items }
    }
}

/// Handle to a diffable store the bridge does not own.
///
/// `token()` identifies the backing store state: a changed token means the
/// store identity was swapped and the bridge rebinds wholesale. While the
/// token is stable the store may hand out `pending_edits()`, its own
/// already-computed update stream, which the bridge applies verbatim,
/// falling back to a rebind if the stream does not fit the bound snapshot.
pub trait ExternalSource<SID: Identifier, IID: Identifier> {
    fn token(&self) -> UpdateToken;

    fn snapshot(&self) -> Snapshot<SID, IID>;

    fn pending_edits(&self) -> Vec<Edit<SID, IID>> {
        Vec::new()
    }
}

/// Content for one update pass.
pub enum Payload<S, I, SID: Identifier, IID: Identifier> {
    /// Immutable models; the bridge derives identifiers and diffs.
    Static {
        content: Vec<SectionModel<S, I>>,
        resolver: IdentityResolver<S, I, SID, IID>,
        token: UpdateToken,
    },
    /// Externally owned diffable store; the bridge only observes.
    External { source: Box<dyn ExternalSource<SID, IID>> },
}

impl<S, I, SID: Identifier, IID: Identifier> Payload<S, I, SID, IID> {
    pub fn token(&self) -> UpdateToken {
        match self {
            Payload::Static { token, .. } => *token,
            Payload::External { source } => source.token(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Static { content, .. } => content.is_empty(),
            Payload::External { source } => source.snapshot().is_empty(),
        }
    }

    pub fn number_of_sections(&self) -> usize {
        match self {
            Payload::Static { content, .. } => content.len(),
            Payload::External { source } => source.snapshot().number_of_sections(),
        }
    }

    pub fn number_of_items(&self) -> usize {
        match self {
            Payload::Static { content, .. } => content.iter().map(|s| s.items.len()).sum(),
            Payload::External { source } => source.snapshot().number_of_items(),
        }
    }

    pub fn contains(&self, path: &IndexPath) -> bool {
        match self {
            Payload::Static { content, .. } => content
                .get(path.section)
                .is_some_and(|s| path.item < s.items.len()),
            Payload::External { source } => source.snapshot().contains(*path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier_map::IdentityResolver;

    fn static_payload() -> Payload<&'static str, u32, &'static str, u32> {
        Payload::Static {
            content: vec![
                SectionModel::new("a", vec![1, 2]),
                SectionModel::new("b", vec![3]),
            ],
            resolver: IdentityResolver::new(|s: &&'static str| *s, |i: &u32| *i),
            token: UpdateToken::fresh(),
        }
    }

    struct FixedSource {
        token: UpdateToken,
        snapshot: Snapshot<&'static str, u32>,
    }

    impl ExternalSource<&'static str, u32> for FixedSource {
        fn token(&self) -> UpdateToken {
            self.token
        }

        fn snapshot(&self) -> Snapshot<&'static str, u32> {
            self.snapshot.clone()
        }
    }

    #[test]
    fn static_queries() {
        let payload = static_payload();
        assert!(!payload.is_empty());
        assert_eq!(payload.number_of_sections(), 2);
        assert_eq!(payload.number_of_items(), 3);
        assert!(payload.contains(&IndexPath::new(0, 1)));
        assert!(!payload.contains(&IndexPath::new(0, 2)));
        assert!(!payload.contains(&IndexPath::new(2, 0)));
    }

    #[test]
    fn empty_static_payload() {
        let payload: Payload<&'static str, u32, &'static str, u32> = Payload::Static {
            content: Vec::new(),
            resolver: IdentityResolver::new(|s: &&'static str| *s, |i: &u32| *i),
            token: UpdateToken::fresh(),
        };
        assert!(payload.is_empty());
        assert_eq!(payload.number_of_items(), 0);
    }

    #[test]
    fn external_queries_delegate_to_the_store() {
        let snapshot =
            Snapshot::from_sections([("a", vec![1u32]), ("b", vec![2, 3])]).unwrap();
        let payload: Payload<&'static str, u32, &'static str, u32> = Payload::External {
            source: Box::new(FixedSource {
                token: UpdateToken::fresh(),
                snapshot,
            }),
        };
        assert!(!payload.is_empty());
        assert_eq!(payload.number_of_sections(), 2);
        assert_eq!(payload.number_of_items(), 3);
        assert!(payload.contains(&IndexPath::new(1, 1)));
    }
}
