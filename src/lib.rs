//! Identifier-keyed reconciliation bridge between a declarative list
//! description and a retained-mode native list widget.
//!
//! The host framework hands over a [`Payload`] once per render pass; the
//! [`HostingController`] derives an identifier [`Snapshot`], diffs it
//! against the applied one with [`DiffEngine`], and drives the platform
//! widget behind the [`NativeListView`] trait. Inconsistent input never
//! escapes as an error: every failure is absorbed by replacing the widget
//! contents wholesale with the requested state.
mod data_source;
mod diff_engine;
mod errors;
mod identifier_map;
mod options;
mod types;

pub use data_source::{ExternalSource, Payload, SectionModel};
pub use diff_engine::DiffEngine;
pub use errors::ReconcileError;
pub use identifier_map::{IdentifierMap, IdentityResolver};
pub use options::{ListOptions, ReorderingCadence, ScrollAnchorPolicy};
pub use types::{Edit, Identifier, IndexPath, ReconciliationPlan, Snapshot, UpdateToken};

use indexmap::IndexSet;
use std::collections::VecDeque;

/// Capability surface of one platform list widget.
///
/// One interface, multiple backend implementations selected at build or
/// configuration time; the controller never branches on the platform.
/// Extents and offsets are in the widget's scroll axis.
pub trait NativeListView<SID: Identifier, IID: Identifier> {
    /// Applies an already-validated edit sequence to the live widget.
    fn apply(&mut self, edits: &[Edit<SID, IID>], animated: bool);

    /// Replaces the widget contents wholesale.
    fn reload(&mut self, snapshot: &Snapshot<SID, IID>);

    fn content_extent(&self) -> f64;

    fn viewport_extent(&self) -> f64;

    fn scroll_offset(&self) -> f64;

    fn set_scroll_offset(&mut self, offset: f64);

    fn scroll_to(&mut self, path: IndexPath);

    fn set_highlighted(&mut self, path: IndexPath, highlighted: bool);
}

struct Callbacks<IID> {
    selection_changed: Option<Box<dyn FnMut(&[IID])>>,
    item_moved: Option<Box<dyn FnMut(&IID, IndexPath, IndexPath)>>,
    item_deleted: Option<Box<dyn FnMut(&IID)>>,
    scroll_offset_changed: Option<Box<dyn FnMut(f64)>>,
}

impl<IID> Default for Callbacks<IID> {
    fn default() -> Self {
        Callbacks {
            selection_changed: None,
            item_moved: None,
            item_deleted: None,
            scroll_offset_changed: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScrollState {
    offset: f64,
    content_extent: f64,
}

type DeferredAction<C> = Box<dyn FnOnce(&mut C)>;

/// Owns the native widget and the applied snapshot, mediating between the
/// host framework's render passes and the widget.
///
/// Single-threaded by design: every update runs synchronously inside one
/// pass on the caller's thread, and the applied snapshot has exactly one
/// owner.
pub struct HostingController<SID: Identifier, IID: Identifier, V: NativeListView<SID, IID>> {
    view: V,
    options: ListOptions,
    current: Snapshot<SID, IID>,
    last_token: Option<UpdateToken>,
    selection: IndexSet<IID>,
    callbacks: Callbacks<IID>,
    deferred: VecDeque<DeferredAction<Self>>,
    pending_moves: Vec<(IndexPath, IndexPath)>,
}

impl<SID: Identifier, IID: Identifier, V: NativeListView<SID, IID>>
    HostingController<SID, IID, V>
{
    pub fn new(view: V, options: ListOptions) -> Self {
        HostingController {
            view,
            options,
            current: Snapshot::new(),
            last_token: None,
            selection: IndexSet::new(),
            callbacks: Callbacks::default(),
            deferred: VecDeque::new(),
            pending_moves: Vec::new(),
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn options(&self) -> &ListOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ListOptions) {
        self.options = options;
    }

    /// The currently applied snapshot.
    pub fn snapshot(&self) -> &Snapshot<SID, IID> {
        &self.current
    }

    pub fn selection(&self) -> impl Iterator<Item = &IID> {
        self.selection.iter()
    }

    // -- update entry ------------------------------------------------------

    /// Runs one update pass against the incoming payload.
    ///
    /// Repeated tokens skip rebuilding entirely. Identifier-equal content
    /// leaves the widget untouched. Content the incremental path cannot
    /// express, including identifier collisions, is absorbed by a full
    /// reset; nothing is propagated back to the host.
    pub fn update<S: Clone, I: Clone>(&mut self, payload: &Payload<S, I, SID, IID>) {
        let token = payload.token();
        if self.last_token == Some(token) {
            match payload {
                Payload::External { source } => self.apply_external_edits(source.as_ref()),
                Payload::Static { .. } => {
                    log::trace!("update token unchanged, skipping rebuild");
                }
            }
            return;
        }
        match payload {
            Payload::Static {
                content, resolver, ..
            } => match IdentifierMap::index(content, resolver) {
                Ok(map) => {
                    let new = map.snapshot().clone();
                    self.reconcile_to(new, token);
                }
                Err(err) => {
                    log::error!("content violates identifier injectivity ({err}); resetting");
                    let snapshot = identifier_map::lossy_snapshot(content, resolver);
                    self.reset_to(snapshot, token);
                }
            },
            Payload::External { source } => {
                // Backing store identity changed (or first bind); the store
                // has already reconciled, bind its state directly.
                self.reset_to(source.snapshot(), token);
            }
        }
    }

    fn reconcile_to(&mut self, new: Snapshot<SID, IID>, token: UpdateToken) {
        if self.current.is_empty() && !new.is_empty() {
            // First population bypasses the differencer.
            self.reset_to(new, token);
            return;
        }
        match DiffEngine::new(&self.current, &new).reconcile() {
            ReconciliationPlan::Unchanged => {
                log::trace!("content unchanged by identifier sequence; no redraw");
                self.last_token = Some(token);
            }
            ReconciliationPlan::Incremental { edits } => {
                let mut working = self.current.clone();
                match working.apply(&edits) {
                    Ok(()) => {
                        let scroll = self.capture_scroll();
                        self.current = working;
                        self.view.apply(&edits, self.animated());
                        self.last_token = Some(token);
                        self.after_content_change(scroll);
                    }
                    Err(err) => {
                        log::warn!("plan application failed ({err}); resetting");
                        self.reset_to(new, token);
                    }
                }
            }
            ReconciliationPlan::Reset { snapshot } => self.reset_to(snapshot, token),
        }
    }

    fn apply_external_edits(&mut self, source: &dyn ExternalSource<SID, IID>) {
        let edits = source.pending_edits();
        if edits.is_empty() {
            return;
        }
        let mut working = self.current.clone();
        match working.apply(&edits) {
            Ok(()) => {
                let scroll = self.capture_scroll();
                self.current = working;
                self.view.apply(&edits, self.animated());
                self.after_content_change(scroll);
            }
            Err(err) => {
                log::warn!("external edit stream not applicable ({err}); rebinding");
                self.reset_to(source.snapshot(), source.token());
            }
        }
    }

    fn reset_to(&mut self, snapshot: Snapshot<SID, IID>, token: UpdateToken) {
        let scroll = self.capture_scroll();
        self.current = snapshot;
        self.view.reload(&self.current);
        self.last_token = Some(token);
        self.after_content_change(scroll);
    }

    fn after_content_change(&mut self, saved: ScrollState) {
        self.prune_selection();
        self.restore_scroll(saved);
    }

    fn animated(&self) -> bool {
        !self.options.disable_animating_differences
    }

    // -- scroll preservation -----------------------------------------------

    fn capture_scroll(&self) -> ScrollState {
        ScrollState {
            offset: self.view.scroll_offset(),
            content_extent: self.view.content_extent(),
        }
    }

    fn restore_scroll(&mut self, saved: ScrollState) {
        let content = self.view.content_extent();
        let viewport = self.view.viewport_extent();
        let max_offset = (content - viewport).max(0.0);
        let target = match self.options.scroll_anchor {
            ScrollAnchorPolicy::Top => 0.0,
            ScrollAnchorPolicy::Bottom => {
                let from_bottom = (saved.content_extent - saved.offset).max(0.0);
                (content - from_bottom).clamp(0.0, max_offset)
            }
            ScrollAnchorPolicy::PreserveOffset => saved.offset.clamp(0.0, max_offset),
        };
        if (target - self.view.scroll_offset()).abs() > f64::EPSILON {
            self.view.set_scroll_offset(target);
        }
    }

    // -- selection ---------------------------------------------------------

    pub fn select_item(&mut self, id: &IID) -> bool {
        let Some(path) = self.current.index_path_of(id) else {
            return false;
        };
        if !self.options.allows_multiple_selection {
            if self.selection.len() == 1 && self.selection.contains(id) {
                return true;
            }
            let previous: Vec<IID> = self.selection.drain(..).collect();
            for prev in &previous {
                if let Some(prev_path) = self.current.index_path_of(prev) {
                    self.view.set_highlighted(prev_path, false);
                }
            }
        }
        if self.selection.insert(id.clone()) {
            self.view.set_highlighted(path, true);
            self.notify_selection_changed();
        }
        true
    }

    pub fn deselect_item(&mut self, id: &IID) -> bool {
        if self.selection.shift_remove(id) {
            if let Some(path) = self.current.index_path_of(id) {
                self.view.set_highlighted(path, false);
            }
            self.notify_selection_changed();
            true
        } else {
            false
        }
    }

    pub fn scroll_to_item(&mut self, id: &IID) -> bool {
        match self.current.index_path_of(id) {
            Some(path) => {
                self.view.scroll_to(path);
                true
            }
            None => false,
        }
    }

    /// Drops selected identifiers that no longer exist in the snapshot.
    fn prune_selection(&mut self) {
        let before = self.selection.len();
        let current = &self.current;
        self.selection.retain(|id| current.index_path_of(id).is_some());
        if self.selection.len() != before {
            self.notify_selection_changed();
        }
    }

    fn notify_selection_changed(&mut self) {
        if let Some(callback) = self.callbacks.selection_changed.as_mut() {
            let ids: Vec<IID> = self.selection.iter().cloned().collect();
            callback(&ids);
        }
    }

    // -- user-driven events from the native widget -------------------------

    pub fn handle_move(&mut self, from: IndexPath, to: IndexPath) {
        match self.options.reordering_cadence {
            ReorderingCadence::Immediate => self.commit_move(from, to),
            ReorderingCadence::EndOfDrag => self.pending_moves.push((from, to)),
        }
    }

    /// Commits moves accumulated under [`ReorderingCadence::EndOfDrag`].
    pub fn finish_drag(&mut self) {
        let moves = std::mem::take(&mut self.pending_moves);
        for (from, to) in moves {
            self.commit_move(from, to);
        }
    }

    fn commit_move(&mut self, from: IndexPath, to: IndexPath) {
        let Some(id) = self.current.remove_at_path(from) else {
            log::warn!("move source {from} does not exist");
            return;
        };
        if let Err(err) = self.current.insert_at_path(to, id.clone()) {
            log::warn!("move target {to} rejected ({err}); restoring");
            let _ = self.current.insert_at_path(from, id);
            return;
        }
        if let Some(callback) = self.callbacks.item_moved.as_mut() {
            callback(&id, from, to);
        }
    }

    /// The native widget already removed the row; mirror it in the snapshot
    /// and let the host update its model on the next render pass.
    pub fn handle_delete(&mut self, path: IndexPath) {
        let Some(id) = self.current.remove_at_path(path) else {
            log::warn!("delete path {path} does not exist");
            return;
        };
        if self.selection.shift_remove(&id) {
            self.notify_selection_changed();
        }
        if let Some(callback) = self.callbacks.item_deleted.as_mut() {
            callback(&id);
        }
    }

    pub fn handle_scroll(&mut self, offset: f64) {
        if let Some(callback) = self.callbacks.scroll_offset_changed.as_mut() {
            callback(offset);
        }
    }

    // -- callbacks ---------------------------------------------------------

    pub fn on_selection_changed(&mut self, callback: impl FnMut(&[IID]) + 'static) {
        self.callbacks.selection_changed = Some(Box::new(callback));
    }

    pub fn on_item_moved(&mut self, callback: impl FnMut(&IID, IndexPath, IndexPath) + 'static) {
        self.callbacks.item_moved = Some(Box::new(callback));
    }

    pub fn on_item_deleted(&mut self, callback: impl FnMut(&IID) + 'static) {
        self.callbacks.item_deleted = Some(Box::new(callback));
    }

    pub fn on_scroll_offset_changed(&mut self, callback: impl FnMut(f64) + 'static) {
        self.callbacks.scroll_offset_changed = Some(Box::new(callback));
    }

    // -- deferred execution ------------------------------------------------

    /// Queues work to run after the current update pass, via
    /// [`HostingController::run_deferred`]. FIFO; no ordering guarantee
    /// beyond "after the pass that queued it".
    pub fn defer(&mut self, action: impl FnOnce(&mut Self) + 'static) {
        self.deferred.push_back(Box::new(action));
    }

    /// Runs queued work. Actions enqueued while running land in the next
    /// turn, not this one.
    pub fn run_deferred(&mut self) {
        let queued: Vec<DeferredAction<Self>> = self.deferred.drain(..).collect();
        for action in queued {
            action(self);
        }
    }

    /// Imperative access keyed by item identifier.
    pub fn proxy(&mut self) -> ListProxy<'_, SID, IID, V> {
        ListProxy { controller: self }
    }
}

/// Thin imperative handle the host exposes to its callers; every action is
/// keyed by item identifier and is a no-op when the identifier is absent.
pub struct ListProxy<'a, SID: Identifier, IID: Identifier, V: NativeListView<SID, IID>> {
    controller: &'a mut HostingController<SID, IID, V>,
}

impl<SID: Identifier, IID: Identifier, V: NativeListView<SID, IID>> ListProxy<'_, SID, IID, V> {
    pub fn scroll_to(&mut self, id: &IID) -> bool {
        self.controller.scroll_to_item(id)
    }

    pub fn select(&mut self, id: &IID) -> bool {
        self.controller.select_item(id)
    }

    pub fn deselect(&mut self, id: &IID) -> bool {
        self.controller.deselect_item(id)
    }
}
