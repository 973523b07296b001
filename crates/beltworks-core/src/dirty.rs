use crate::grid::ChunkCoord;
use std::collections::BTreeSet;

/// Tracks which chunks changed since a renderer last looked.
///
/// This is the observation side of dirtiness: a chunk's own dirty flag
/// decides whether the clock ticks it, while this set decides what an outside
/// observer still has to redraw. Call [`drain`](DirtyTracker::drain) to take
/// the set and start a new observation window.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    changed: BTreeSet<ChunkCoord>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a chunk as changed. Returns `true` the first time a chunk is
    /// marked in the current window.
    pub fn mark(&mut self, chunk: ChunkCoord) -> bool {
        self.changed.insert(chunk)
    }

    pub fn is_dirty(&self, chunk: ChunkCoord) -> bool {
        self.changed.contains(&chunk)
    }

    /// Returns `true` if anything changed since the last drain.
    pub fn any_dirty(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Changed chunks in coordinate order.
    pub fn changed(&self) -> &BTreeSet<ChunkCoord> {
        &self.changed
    }

    /// Take the changed set, leaving the tracker clean.
    pub fn drain(&mut self) -> Vec<ChunkCoord> {
        std::mem::take(&mut self.changed).into_iter().collect()
    }

    pub fn mark_clean(&mut self) {
        self.changed.clear();
    }
}
