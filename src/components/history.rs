use crate::ops::transform::Orientation;
use crate::raster::RasterBuffer;

// ============================================================================
// FRAME / SNAPSHOT
// ============================================================================

/// What an edit can change: the committed pixels, their orientation
/// relative to the loaded photo, and whether the background is cut out.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub buffer: RasterBuffer,
    pub orientation: Orientation,
    pub background_removed: bool,
}

impl Frame {
    pub fn new(buffer: RasterBuffer) -> Self {
        Self {
            buffer,
            orientation: Orientation::default(),
            background_removed: false,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.buffer.byte_size()
    }
}

/// A full copy of the committed frame taken on one side of an edit.
///
/// On the undo stack it holds the state *before* the edit; on the redo stack
/// the state *after* it.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub description: String,
    pub frame: Frame,
}

impl Snapshot {
    pub fn memory_size(&self) -> usize {
        self.frame.byte_size() + self.description.len()
    }
}

// ============================================================================
// EDIT HISTORY
// ============================================================================

/// Undo/redo stacks of deep frame snapshots, most recent last. Unbounded.
#[derive(Default)]
pub struct EditHistory {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `before` (a deep copy of the pre-edit frame) and drop the redo
    /// branch.
    pub fn commit(&mut self, before: Frame, description: impl Into<String>) {
        for snap in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(snap.memory_size());
        }
        let snap = Snapshot {
            description: description.into(),
            frame: before,
        };
        self.total_memory += snap.memory_size();
        self.undo_stack.push(snap);
    }

    /// Restore the most recent pre-edit snapshot into `committed`. The
    /// replaced buffer moves onto the redo stack. Returns the description of
    /// the undone edit.
    pub fn undo(&mut self, committed: &mut Frame) -> Option<String> {
        let snap = self.undo_stack.pop()?;
        self.total_memory = self.total_memory.saturating_sub(snap.memory_size());
        let description = snap.description;
        let current = std::mem::replace(committed, snap.frame);
        let redo = Snapshot {
            description: description.clone(),
            frame: current,
        };
        self.total_memory += redo.memory_size();
        self.redo_stack.push(redo);
        Some(description)
    }

    pub fn redo(&mut self, committed: &mut Frame) -> Option<String> {
        let snap = self.redo_stack.pop()?;
        self.total_memory = self.total_memory.saturating_sub(snap.memory_size());
        let description = snap.description;
        let current = std::mem::replace(committed, snap.frame);
        let undo = Snapshot {
            description: description.clone(),
            frame: current,
        };
        self.total_memory += undo.memory_size();
        self.undo_stack.push(undo);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().map(|s| s.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|s| s.description.as_str())
    }

    /// All undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<&str> {
        self.undo_stack.iter().rev().map(|s| s.description.as_str()).collect()
    }

    /// Bytes held by both stacks (O(1) via cached total).
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }
}
