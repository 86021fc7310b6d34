//! Undo/redo log of scene snapshots.
//!
//! The top of the undo stack is always the last committed state. The log has
//! two states: while [`HistoryState::Recording`], [`History::record`] appends
//! new entries; restoring a snapshot switches to [`HistoryState::Paused`] so
//! the commit it causes is not mistaken for a user edit. Only an explicit
//! [`History::resume`] starts recording again.

use crate::config::DEFAULT_MAX_HISTORY_ENTRIES;
use crate::element::{Element, ElementId, ElementPatch, ViewState};
use crate::fractional::order_by;
use crate::mutate::new_element_with;
use crate::scene::Scene;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised when a snapshot cannot be restored.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot contains element {0} more than once")]
    DuplicateElement(ElementId),
    #[error("Snapshot element {0} has no order key")]
    MissingOrderKey(ElementId),
    #[error("Failed to decode snapshot: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A detached copy of the scene plus the view it was seen in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Every element, tombstones included, in scene order.
    pub elements: Vec<Element>,
    /// View context to restore with the elements.
    #[serde(default)]
    pub view: ViewState,
}

impl HistoryEntry {
    /// Snapshot the committed state of a scene.
    pub fn capture(scene: &Scene, view: &ViewState) -> Self {
        Self {
            elements: scene.elements_including_deleted().to_vec(),
            view: view.clone(),
        }
    }

    /// Check that the snapshot can be restored as a whole.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut seen = HashSet::with_capacity(self.elements.len());
        for element in &self.elements {
            if !seen.insert(&element.id) {
                return Err(SnapshotError::DuplicateElement(element.id.clone()));
            }
            if element.order_key.is_none() {
                return Err(SnapshotError::MissingOrderKey(element.id.clone()));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(SnapshotError::Encode)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str(json).map_err(SnapshotError::Decode)
    }
}

/// The snapshot value of an element, stamped on top of its live version.
///
/// Returns the live copy unchanged when only version fields differ.
fn restamp(snapshot: &Element, live: &Element) -> Element {
    let mut restored = snapshot.clone();
    restored.version = live.version;
    restored.version_nonce = live.version_nonce;
    restored.updated = live.updated;
    if restored == *live {
        return restored;
    }
    new_element_with(&restored, &ElementPatch::new(), true)
}

/// Whether the log is capturing commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryState {
    #[default]
    Recording,
    Paused,
}

/// Undo and redo stacks for one editing session.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    state: HistoryState,
    max_entries: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_ENTRIES)
    }
}

impl History {
    /// Create an empty log keeping at most `max_entries` undo states.
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            state: HistoryState::Recording,
            max_entries: max_entries.max(1),
        }
    }

    pub fn state(&self) -> HistoryState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == HistoryState::Recording
    }

    /// Stop capturing commits.
    pub fn pause(&mut self) {
        self.state = HistoryState::Paused;
    }

    /// Start capturing commits again.
    pub fn resume(&mut self) {
        self.state = HistoryState::Recording;
    }

    /// Append an entry unless it equals the current top.
    ///
    /// Returns true if the entry was appended.
    pub fn push(&mut self, entry: HistoryEntry) -> bool {
        if self.undo_stack.last() == Some(&entry) {
            return false;
        }
        self.undo_stack.push(entry);
        if self.undo_stack.len() > self.max_entries {
            self.undo_stack.remove(0);
        }
        true
    }

    /// Capture a committed state as a new undo step.
    ///
    /// Ignored while paused. A new step discards the redo stack.
    pub fn record(&mut self, entry: HistoryEntry) -> bool {
        if !self.is_recording() {
            log::debug!("History paused, not recording commit");
            return false;
        }
        if self.push(entry) {
            self.redo_stack.clear();
            true
        } else {
            false
        }
    }

    /// Replace the scene contents with a snapshot and pause recording.
    ///
    /// The snapshot is validated before anything changes. Elements that
    /// differ from their live copy are restored as a new version, so versions
    /// never go backwards and peers adopt the restored state. Elements that
    /// are live in the scene but absent from the snapshot are kept as
    /// tombstones.
    pub fn restore(&mut self, entry: &HistoryEntry, scene: &mut Scene) -> Result<(), SnapshotError> {
        entry.validate()?;
        self.pause();

        let mut next: Vec<Element> = entry
            .elements
            .iter()
            .map(|snapshot| match scene.element(&snapshot.id) {
                Some(live) => restamp(snapshot, live),
                None => snapshot.clone(),
            })
            .collect();

        let snapshot_ids: HashSet<&ElementId> = entry.elements.iter().map(|e| &e.id).collect();
        let orphans: Vec<Element> = scene
            .elements_including_deleted()
            .iter()
            .filter(|e| !snapshot_ids.contains(&e.id))
            .map(|e| {
                if e.is_deleted {
                    e.clone()
                } else {
                    new_element_with(e, &ElementPatch::new().deleted(true), true)
                }
            })
            .collect();

        if !orphans.is_empty() {
            next.extend(orphans);
            order_by(&mut next);
        }
        scene.replace_all(next);
        Ok(())
    }

    /// Step back to the previous state.
    ///
    /// Returns the view stored with the restored state, or `None` if there is
    /// nothing to undo. Leaves the log paused.
    pub fn undo(&mut self, scene: &mut Scene) -> Result<Option<ViewState>, SnapshotError> {
        if self.undo_stack.len() < 2 {
            return Ok(None);
        }
        let target = self.undo_stack[self.undo_stack.len() - 2].clone();
        self.restore(&target, scene)?;

        if let Some(current) = self.undo_stack.pop() {
            self.redo_stack.push(current);
        }
        self.sync_top(scene);
        Ok(Some(target.view))
    }

    /// Re-apply the last undone state.
    ///
    /// Returns the view stored with the restored state, or `None` if there is
    /// nothing to redo. Leaves the log paused.
    pub fn redo(&mut self, scene: &mut Scene) -> Result<Option<ViewState>, SnapshotError> {
        let Some(target) = self.redo_stack.last().cloned() else {
            return Ok(None);
        };
        self.restore(&target, scene)?;

        self.redo_stack.pop();
        self.push(target.clone());
        self.sync_top(scene);
        Ok(Some(target.view))
    }

    /// Make the top entry match what the scene actually committed.
    fn sync_top(&mut self, scene: &Scene) {
        if let Some(top) = self.undo_stack.last_mut() {
            let committed = HistoryEntry::capture(scene, &top.view);
            *top = committed;
        }
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
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

    /// The current top of the undo stack.
    pub fn top(&self) -> Option<&HistoryEntry> {
        self.undo_stack.last()
    }

    /// Drop both stacks.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
