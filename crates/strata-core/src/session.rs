//! Editing session: the owner of one scene and its history.

use crate::config::SessionConfig;
use crate::element::{Element, ElementId, ElementPatch, ViewState};
use crate::history::{History, HistoryEntry, SnapshotError};
use crate::mutate::ShapeCache;
use crate::reconcile::reconcile_elements;
use crate::scene::{MutateOptions, Scene, SceneCallback, SubscriptionError, SubscriptionId};
use crate::zindex::{move_elements, ZMove};
use std::collections::HashSet;

/// One open document.
///
/// Every write goes through the scene and is then offered to the history,
/// which keeps it only while recording. Nothing here is global, so any
/// number of sessions can coexist.
#[derive(Debug)]
pub struct EditingSession {
    scene: Scene,
    history: History,
    view: ViewState,
    config: SessionConfig,
}

impl Default for EditingSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl EditingSession {
    /// Create a session with an empty scene.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_scene(config, Scene::new())
    }

    /// Create a session whose scene invalidates `cache` on every stamp.
    pub fn with_shape_cache(config: SessionConfig, cache: Box<dyn ShapeCache>) -> Self {
        Self::with_scene(config, Scene::with_shape_cache(cache))
    }

    fn with_scene(config: SessionConfig, mut scene: Scene) -> Self {
        scene.set_validate_indices(config.validate_indices);
        let mut history = History::new(config.max_history_entries);
        let view = ViewState::default();
        history.record(HistoryEntry::capture(&scene, &view));
        Self {
            scene,
            history,
            view,
            config,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Update the view context stored with future snapshots.
    pub fn set_view(&mut self, view: ViewState) {
        self.view = view;
    }

    pub fn subscribe(&mut self, callback: SceneCallback) -> Result<SubscriptionId, SubscriptionError> {
        self.scene.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), SubscriptionError> {
        self.scene.unsubscribe(id)
    }

    /// Offer the committed state to the history.
    fn capture(&mut self) -> bool {
        self.history.record(HistoryEntry::capture(&self.scene, &self.view))
    }

    /// Replace the whole element array.
    pub fn commit(&mut self, elements: Vec<Element>) {
        self.scene.replace_all(elements);
        self.capture();
    }

    /// Add an element on top of everything else.
    pub fn add_element(&mut self, element: Element) {
        let index = self.scene.len();
        self.insert_element_at(element, index);
    }

    /// Insert an element at an array position.
    pub fn insert_element_at(&mut self, element: Element, index: usize) {
        self.scene.insert_element_at(element, index);
        self.capture();
    }

    /// Apply a patch to one element. Returns false for an unknown id.
    pub fn mutate_element(&mut self, id: &ElementId, patch: &ElementPatch) -> bool {
        let found = self.scene.mutate_element(id, patch, MutateOptions::default());
        if found {
            self.capture();
        }
        found
    }

    /// Apply several patches as one undo step.
    pub fn mutate_elements<I>(&mut self, updates: I) -> usize
    where
        I: IntoIterator<Item = (ElementId, ElementPatch)>,
    {
        let applied = self.scene.mutate_elements(updates, true);
        if applied > 0 {
            self.capture();
        }
        applied
    }

    /// Tombstone elements.
    pub fn delete_elements(&mut self, ids: &[ElementId]) -> usize {
        let updates: Vec<(ElementId, ElementPatch)> = ids
            .iter()
            .filter(|id| self.scene.non_deleted_element(id).is_some())
            .map(|id| (id.clone(), ElementPatch::new().deleted(true)))
            .collect();
        self.mutate_elements(updates)
    }

    /// Move elements in z-order. Returns false if nothing moved.
    pub fn move_elements(&mut self, ids: &[ElementId], mv: ZMove) -> bool {
        let selected: HashSet<ElementId> = ids.iter().cloned().collect();
        let next = move_elements(self.scene.elements_including_deleted(), &selected, mv);
        if next.as_slice() == self.scene.elements_including_deleted() {
            return false;
        }
        self.commit(next);
        true
    }

    /// Merge elements received from another peer.
    ///
    /// Foreign updates are never undoable: recording is paused around the
    /// commit and resumed afterwards.
    pub fn apply_remote(&mut self, remote: &[Element]) {
        let merged = reconcile_elements(self.scene.elements_including_deleted(), remote);
        let was_recording = self.history.is_recording();
        self.history.pause();
        self.scene.replace_all(merged);
        if was_recording {
            self.history.resume();
        }
    }

    /// Step back one edit. Returns false if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool, SnapshotError> {
        let restored = self.history.undo(&mut self.scene);
        self.finish_restore(restored)
    }

    /// Re-apply one undone edit. Returns false if there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool, SnapshotError> {
        let restored = self.history.redo(&mut self.scene);
        self.finish_restore(restored)
    }

    fn finish_restore(&mut self, restored: Result<Option<ViewState>, SnapshotError>) -> Result<bool, SnapshotError> {
        let view = restored?;
        let done = view.is_some();
        if let Some(view) = view {
            self.view = view;
        }
        self.history.resume();
        Ok(done)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fractional::validate_indices;

    fn session() -> EditingSession {
        EditingSession::new(SessionConfig {
            max_history_entries: 10,
            validate_indices: true,
        })
    }

    fn ids(session: &EditingSession) -> Vec<String> {
        session.scene().elements().map(|e| e.id.to_string()).collect()
    }

    #[test]
    fn test_add_and_undo() {
        let mut s = session();
        s.add_element(Element::with_id("a"));
        s.add_element(Element::with_id("b"));

        assert_eq!(ids(&s), vec!["a", "b"]);
        assert!(validate_indices(s.scene().elements_including_deleted()).is_ok());

        assert!(s.undo().unwrap());
        assert_eq!(ids(&s), vec!["a"]);
        assert!(s.scene().element(&"b".into()).unwrap().is_deleted);
        assert!(s.history().is_recording());

        assert!(s.redo().unwrap());
        assert_eq!(ids(&s), vec!["a", "b"]);
    }

    #[test]
    fn test_undo_restores_view() {
        let mut s = session();
        let mut view = ViewState::default();
        view.selected_element_ids.insert("a".into());
        s.set_view(view.clone());
        s.add_element(Element::with_id("a"));

        s.set_view(ViewState::default());
        s.add_element(Element::with_id("b"));

        s.undo().unwrap();
        assert_eq!(s.view(), &view);
    }

    #[test]
    fn test_nothing_to_undo() {
        let mut s = session();
        assert!(!s.can_undo());
        assert!(!s.undo().unwrap());
        assert!(!s.redo().unwrap());
    }

    #[test]
    fn test_remote_updates_are_not_undoable() {
        let mut s = session();
        s.add_element(Element::with_id("a"));
        let undo_len = s.history().undo_len();

        s.apply_remote(&[Element::with_id("remote").with_order_key("b0")]);

        assert_eq!(ids(&s), vec!["a", "remote"]);
        assert_eq!(s.history().undo_len(), undo_len);
        assert!(s.history().is_recording());
    }

    #[test]
    fn test_delete_and_move() {
        let mut s = session();
        for id in ["a", "b", "c"] {
            s.add_element(Element::with_id(id));
        }
        assert!(s.move_elements(&["a".into()], ZMove::ToFront));
        assert_eq!(ids(&s), vec!["b", "c", "a"]);

        assert_eq!(s.delete_elements(&["c".into(), "missing".into()]), 1);
        assert_eq!(ids(&s), vec!["b", "a"]);
        assert_eq!(s.scene().len(), 3);

        s.undo().unwrap();
        assert_eq!(ids(&s), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_move_that_changes_nothing_is_not_recorded() {
        let mut s = session();
        s.add_element(Element::with_id("a"));
        s.add_element(Element::with_id("b"));
        let before = s.scene().element(&"b".into()).unwrap().clone();
        let undo_len = s.history().undo_len();

        assert!(!s.move_elements(&["b".into()], ZMove::Forward));
        assert!(!s.move_elements(&["b".into()], ZMove::ToFront));

        assert_eq!(s.scene().element(&"b".into()), Some(&before));
        assert_eq!(s.history().undo_len(), undo_len);
    }

    #[test]
    fn test_mutate_is_one_undo_step() {
        let mut s = session();
        s.add_element(Element::with_id("a"));
        s.add_element(Element::with_id("b"));
        let before = s.history().undo_len();

        s.mutate_elements(vec![
            (ElementId::from("a"), ElementPatch::new().prop("x", 1)),
            (ElementId::from("b"), ElementPatch::new().prop("x", 1)),
        ]);
        assert_eq!(s.history().undo_len(), before + 1);

        assert!(!s.mutate_element(&"zz".into(), &ElementPatch::new()));
        assert_eq!(s.history().undo_len(), before + 1);
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut one = session();
        let two = session();
        one.add_element(Element::with_id("a"));

        assert_eq!(one.scene().len(), 1);
        assert!(two.scene().is_empty());
    }
}
