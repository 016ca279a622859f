//! Bounded undo/redo history (§4.5 "History").

use crate::store::watcher::StoreChange;
use std::collections::VecDeque;

pub struct History {
    entries: VecDeque<StoreChange>,
    redo_stack: Vec<StoreChange>,
    max_history: usize,
    enabled: bool,
}

impl History {
    pub fn new(enabled: bool, max_history: usize) -> Self {
        History {
            entries: VecDeque::new(),
            redo_stack: Vec::new(),
            max_history,
            enabled,
        }
    }

    /// Records a new change, clearing the redo stack — any external write
    /// invalidates a pending `redo()`.
    pub fn record(&mut self, change: StoreChange) {
        self.redo_stack.clear();
        if !self.enabled {
            return;
        }
        if self.entries.len() >= self.max_history {
            self.entries.pop_front();
        }
        self.entries.push_back(change);
    }

    /// Pops the newest change for `undo()`, pushing it onto the redo stack.
    pub fn pop_for_undo(&mut self) -> Option<StoreChange> {
        let change = self.entries.pop_back()?;
        self.redo_stack.push(change.clone());
        Some(change)
    }

    /// Pops the most recently undone change for `redo()`.
    pub fn pop_for_redo(&mut self) -> Option<StoreChange> {
        let change = self.redo_stack.pop()?;
        if self.enabled {
            self.entries.push_back(change.clone());
        }
        Some(change)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.redo_stack.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
