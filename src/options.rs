//! Display and behavior options supplied by the host framework.
use serde::{Deserialize, Serialize};

/// When a user-driven reorder is committed to the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReorderingCadence {
    /// Commit each move as it happens.
    #[default]
    Immediate,
    /// Accumulate moves and commit when the drag session ends.
    EndOfDrag,
}

/// How the scroll position is restored after a content update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollAnchorPolicy {
    /// Snap back to the leading edge.
    Top,
    /// Keep the distance to the trailing edge.
    Bottom,
    /// Keep the absolute offset, clamped to the new content extent.
    #[default]
    PreserveOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    pub allows_multiple_selection: bool,
    pub disable_animating_differences: bool,
    pub reordering_cadence: ReorderingCadence,
    pub scroll_anchor: ScrollAnchorPolicy,
}

impl Default for ListOptions {
    fn default() -> Self {
        ListOptions {
            allows_multiple_selection: false,
            disable_animating_differences: false,
            reordering_cadence: ReorderingCadence::default(),
            scroll_anchor: ScrollAnchorPolicy::default(),
        }
    }
}
