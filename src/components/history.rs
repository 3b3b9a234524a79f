use image::RgbaImage;
use std::collections::VecDeque;

use crate::canvas::{Layer, snapshot_or_warn};

pub const DEFAULT_MAX_UNDO: usize = 25;

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Immutable full copy of the paint layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pixels: RgbaImage,
}

impl Snapshot {
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn memory_size(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

// ============================================================================
// HISTORY MANAGER - bounded undo, unbounded redo
// ============================================================================

/// Snapshot-based undo/redo for the paint layer.
///
/// The bottom of the undo stack is the state the layer was in when history
/// was last reset, so undo refuses to pop the final entry.
#[derive(Clone, Debug)]
pub struct HistoryManager {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: Vec<Snapshot>,
    max_undo: usize,
    /// Running byte total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO)
    }
}

impl HistoryManager {
    pub fn new(max_undo: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_undo: max_undo.max(1),
            total_memory: 0,
        }
    }

    /// Record the current state of `layer`. Returns `false` if it was skipped.
    pub fn snapshot(&mut self, layer: &Layer) -> bool {
        let Some(pixels) = snapshot_or_warn(layer) else {
            return false;
        };

        for snap in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(snap.memory_size());
        }

        let snap = Snapshot { pixels };
        self.total_memory += snap.memory_size();
        self.undo_stack.push_back(snap);
        self.prune();
        true
    }

    /// Step back one commit. Returns `false` when only the baseline is left.
    pub fn undo(&mut self, layer: &mut Layer) -> bool {
        if self.undo_stack.len() <= 1 {
            return false;
        }
        let Some(top) = self.undo_stack.pop_back() else {
            return false;
        };
        self.redo_stack.push(top);
        if let Some(current) = self.undo_stack.back() {
            layer.restore(&current.pixels);
        }
        true
    }

    pub fn redo(&mut self, layer: &mut Layer) -> bool {
        let Some(next) = self.redo_stack.pop() else {
            return false;
        };
        layer.restore(&next.pixels);
        self.undo_stack.push_back(next);
        self.prune();
        true
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_undo(&self) -> usize {
        self.max_undo
    }

    /// Change the bound; excess oldest entries go immediately.
    pub fn set_max_undo(&mut self, max_undo: usize) {
        self.max_undo = max_undo.max(1);
        self.prune();
    }

    /// Bytes held by both stacks.
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn reset(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_undo {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn layer_with(v: u8) -> Layer {
        Layer::filled(4, 4, Rgba([v, v, v, 255]))
    }

    #[test]
    fn undo_needs_more_than_baseline() {
        let mut h = HistoryManager::default();
        let mut layer = layer_with(0);
        assert!(h.snapshot(&layer));
        assert!(!h.undo(&mut layer));
        assert!(!h.redo(&mut layer));
    }

    #[test]
    fn undo_then_redo_restores_exactly() {
        let mut h = HistoryManager::default();
        let mut layer = layer_with(0);
        h.snapshot(&layer);
        layer = layer_with(9);
        h.snapshot(&layer);

        assert!(h.undo(&mut layer));
        assert_eq!(layer, layer_with(0));
        assert!(h.can_redo());
        assert!(h.redo(&mut layer));
        assert_eq!(layer, layer_with(9));
        assert!(!h.can_redo());
    }

    #[test]
    fn new_commit_clears_redo() {
        let mut h = HistoryManager::default();
        let mut layer = layer_with(0);
        h.snapshot(&layer);
        layer = layer_with(1);
        h.snapshot(&layer);
        h.undo(&mut layer);
        assert_eq!(h.redo_count(), 1);
        layer = layer_with(2);
        h.snapshot(&layer);
        assert_eq!(h.redo_count(), 0);
    }

    #[test]
    fn bounded_by_max_undo() {
        let mut h = HistoryManager::new(3);
        for v in 0..10 {
            h.snapshot(&layer_with(v));
        }
        assert_eq!(h.undo_count(), 3);
        assert_eq!(h.memory_usage(), 3 * 4 * 4 * 4);
        h.set_max_undo(2);
        assert_eq!(h.undo_count(), 2);
    }

    #[test]
    fn zero_size_layer_is_skipped() {
        let mut h = HistoryManager::default();
        assert!(!h.snapshot(&Layer::new(0, 0)));
        assert_eq!(h.undo_count(), 0);
    }

    #[test]
    fn reset_empties_everything() {
        let mut h = HistoryManager::default();
        h.snapshot(&layer_with(3));
        h.snapshot(&layer_with(4));
        h.reset();
        assert_eq!((h.undo_count(), h.redo_count(), h.memory_usage()), (0, 0, 0));
    }
}
