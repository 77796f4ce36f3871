//! Undo/redo log for cell edits
//!
//! Every cell mutation goes through [`EditLog::set_cell`], which records the
//! old and new cell. Both stacks are bounded; the oldest entry is dropped when
//! a push would exceed the limit.

use std::collections::VecDeque;

use crate::{Cell, Song};

/// One recorded cell change
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdit {
    pub pattern_id: u32,
    pub channel: usize,
    pub row: usize,
    pub old: Cell,
    pub new: Cell,
}

/// Bounded undo/redo stacks
#[derive(Debug, Clone)]
pub struct EditLog {
    undo: VecDeque<CellEdit>,
    redo: VecDeque<CellEdit>,
    limit: usize,
}

impl Default for EditLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}

impl EditLog {
    pub const DEFAULT_LIMIT: usize = 100;

    /// Create a log holding at most `limit` entries per stack
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Change the bound, dropping the oldest entries that no longer fit
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
        while self.redo.len() > self.limit {
            self.redo.pop_front();
        }
    }

    /// Write a cell and record the change
    ///
    /// Out-of-range targets are ignored and return `false`. A successful edit
    /// clears the redo stack.
    pub fn set_cell(
        &mut self,
        song: &mut Song,
        pattern_id: u32,
        channel: usize,
        row: usize,
        cell: Cell,
    ) -> bool {
        let Some(slot) = song.cell_mut(pattern_id, channel, row) else {
            tracing::debug!(pattern_id, channel, row, "cell edit out of range, ignored");
            return false;
        };
        let old = std::mem::replace(slot, cell.clone());
        push_bounded(
            &mut self.undo,
            CellEdit {
                pattern_id,
                channel,
                row,
                old,
                new: cell,
            },
            self.limit,
        );
        self.redo.clear();
        true
    }

    /// Revert the most recent edit
    ///
    /// Returns `false` when there is nothing to undo. If the edited cell no
    /// longer exists (pattern deleted or shortened), the whole history is
    /// dropped since the remaining entries cannot be trusted either.
    pub fn undo(&mut self, song: &mut Song) -> bool {
        let Some(edit) = self.undo.pop_back() else {
            return false;
        };
        let Some(slot) = song.cell_mut(edit.pattern_id, edit.channel, edit.row) else {
            tracing::warn!(pattern_id = edit.pattern_id, "undo target is gone, clearing history");
            self.clear();
            return false;
        };
        *slot = edit.old.clone();
        push_bounded(&mut self.redo, edit, self.limit);
        true
    }

    /// Re-apply the most recently undone edit
    pub fn redo(&mut self, song: &mut Song) -> bool {
        let Some(edit) = self.redo.pop_back() else {
            return false;
        };
        let Some(slot) = song.cell_mut(edit.pattern_id, edit.channel, edit.row) else {
            tracing::warn!(pattern_id = edit.pattern_id, "redo target is gone, clearing history");
            self.clear();
            return false;
        };
        *slot = edit.new.clone();
        push_bounded(&mut self.undo, edit, self.limit);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Forget all recorded edits
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

fn push_bounded(stack: &mut VecDeque<CellEdit>, edit: CellEdit, limit: usize) {
    if stack.len() >= limit {
        stack.pop_front();
    }
    stack.push_back(edit);
}
