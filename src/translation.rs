//! Per-mapping translation from file-page index to frame.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Growable association from a file-page index to the frame currently
/// holding it, scoped to one mapping.
///
/// Invariant upheld by callers (the fault engine): at most one frame per
/// page index, and at most one page index per frame, across the whole
/// cache — this table only ever records the mapping-local half of that.
#[derive(Default)]
pub(crate) struct TranslationTable {
    entries: RwLock<HashMap<u64, usize>>,
}

impl TranslationTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn lookup(&self, page_index: u64) -> Option<usize> {
        self.entries.read().get(&page_index).copied()
    }

    pub(crate) fn insert(&self, page_index: u64, frame_idx: usize) {
        self.entries.write().insert(page_index, frame_idx);
    }

    pub(crate) fn remove(&self, page_index: u64) {
        self.entries.write().remove(&page_index);
    }

    /// Frame indices currently bound through this table, for flush/unmap.
    pub(crate) fn bound_frames(&self) -> Vec<(u64, usize)> {
        self.entries
            .read()
            .iter()
            .map(|(&page, &frame)| (page, frame))
            .collect()
    }

}
