//! The element store.
//!
//! A [`Scene`] owns the canonical element array, tombstones included, plus an
//! id index. Every write ends in [`Scene::replace_all`] or an explicit
//! [`Scene::trigger_update`], so subscribers only ever observe arrays whose
//! order keys are strictly increasing.

use crate::element::{Element, ElementId, ElementPatch};
use crate::fractional::{normalize, order_by, reorder, validate_indices};
use crate::mutate::{self, NoShapeCache, ShapeCache};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Callback invoked synchronously after every commit.
pub type SceneCallback = Rc<dyn Fn(&Scene)>;

/// Handle returned by [`Scene::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Misuse of the subscription registry.
///
/// These indicate a broken observer lifecycle in the caller and should be
/// treated as bugs, not recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("Callback is already subscribed as {0:?}")]
    AlreadySubscribed(SubscriptionId),
    #[error("Unknown subscription {0:?}")]
    UnknownSubscription(SubscriptionId),
}

/// Options for a single-element mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutateOptions {
    /// Increment the version and draw a new nonce.
    pub bump_version: bool,
    /// Notify subscribers once the element is updated.
    pub inform: bool,
}

impl Default for MutateOptions {
    fn default() -> Self {
        Self {
            bump_version: true,
            inform: true,
        }
    }
}

/// The canonical, ordered element collection of one editing session.
pub struct Scene {
    /// All elements, tombstones included, in order key order.
    elements: Vec<Element>,
    /// Element id to position in `elements`.
    index: HashMap<ElementId, usize>,
    subscribers: Vec<(SubscriptionId, SceneCallback)>,
    next_subscription: u64,
    /// Random value regenerated on every update, for render caches.
    scene_nonce: Option<u32>,
    shape_cache: Box<dyn ShapeCache>,
    /// Validate committed arrays and log violations.
    validate: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("elements", &self.elements)
            .field("subscribers", &self.subscribers.len())
            .field("scene_nonce", &self.scene_nonce)
            .finish()
    }
}

impl Scene {
    /// Create an empty scene with no shape cache.
    pub fn new() -> Self {
        Self::with_shape_cache(Box::new(NoShapeCache))
    }

    /// Create an empty scene that invalidates `cache` on every stamp.
    pub fn with_shape_cache(cache: Box<dyn ShapeCache>) -> Self {
        Self {
            elements: Vec::new(),
            index: HashMap::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
            scene_nonce: None,
            shape_cache: cache,
            validate: false,
        }
    }

    /// Enable or disable validation of committed arrays.
    pub fn set_validate_indices(&mut self, validate: bool) {
        self.validate = validate;
    }

    /// Non-deleted elements in order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|e| !e.is_deleted)
    }

    /// All elements in order, tombstones included.
    pub fn elements_including_deleted(&self) -> &[Element] {
        &self.elements
    }

    /// Get an element by id, deleted or not.
    pub fn element(&self, id: &ElementId) -> Option<&Element> {
        self.index.get(id).map(|&pos| &self.elements[pos])
    }

    /// Get an element by id unless it is a tombstone.
    pub fn non_deleted_element(&self, id: &ElementId) -> Option<&Element> {
        self.element(id).filter(|e| !e.is_deleted)
    }

    /// Number of elements, tombstones included.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Nonce of the last update, `None` before the first one.
    pub fn scene_nonce(&self) -> Option<u32> {
        self.scene_nonce
    }

    /// Swap in a new element array.
    ///
    /// The array order is kept; invalid order keys are repaired before the
    /// swap, then subscribers are notified.
    pub fn replace_all(&mut self, next: Vec<Element>) {
        self.commit(normalize(next));
        self.trigger_update();
    }

    fn commit(&mut self, elements: Vec<Element>) {
        if self.validate {
            if let Err(err) = validate_indices(&elements) {
                log::error!("{}", err);
            }
        }

        self.index.clear();
        for (pos, element) in elements.iter().enumerate() {
            if self.index.insert(element.id.clone(), pos).is_some() {
                log::warn!("Duplicate element id in scene: {}", element.id);
            }
        }
        self.elements = elements;
    }

    /// Regenerate the scene nonce and notify every subscriber.
    pub fn trigger_update(&mut self) {
        self.scene_nonce = Some(mutate::random_nonce());

        let subscribers: Vec<SceneCallback> = self.subscribers.iter().map(|(_, cb)| cb.clone()).collect();
        for callback in subscribers {
            callback(self);
        }
    }

    /// Stamp one element through the version stamper.
    ///
    /// Returns false if no element has this id. A patch that sets an order
    /// key re-sorts the array before the next read.
    pub fn mutate_element(&mut self, id: &ElementId, patch: &ElementPatch, options: MutateOptions) -> bool {
        let Some(&pos) = self.index.get(id) else {
            return false;
        };
        mutate::mutate_element(&mut self.elements[pos], patch, options.bump_version, self.shape_cache.as_mut());
        if patch.order_key.is_some() {
            self.resort();
        }
        if options.inform {
            self.trigger_update();
        }
        true
    }

    /// Stamp many elements and notify once.
    ///
    /// Returns how many elements were found and updated.
    pub fn mutate_elements<I>(&mut self, updates: I, bump_version: bool) -> usize
    where
        I: IntoIterator<Item = (ElementId, ElementPatch)>,
    {
        let mut applied = 0;
        let mut resort = false;
        for (id, patch) in updates {
            let Some(&pos) = self.index.get(&id) else {
                log::debug!("Skipping update for unknown element {}", id);
                continue;
            };
            mutate::mutate_element(&mut self.elements[pos], &patch, bump_version, self.shape_cache.as_mut());
            resort |= patch.order_key.is_some();
            applied += 1;
        }
        if resort {
            self.resort();
        }
        if applied > 0 {
            self.trigger_update();
        }
        applied
    }

    fn resort(&mut self) {
        let mut elements = std::mem::take(&mut self.elements);
        order_by(&mut elements);
        self.commit(normalize(elements));
    }

    /// Map every element, committing only if something changed.
    ///
    /// `iteratee` returns `None` to keep an element as it is.
    pub fn map_elements<F>(&mut self, mut iteratee: F) -> bool
    where
        F: FnMut(&Element) -> Option<Element>,
    {
        let mut changed = false;
        let next: Vec<Element> = self
            .elements
            .iter()
            .map(|element| match iteratee(element) {
                Some(mapped) => {
                    changed = true;
                    mapped
                }
                None => element.clone(),
            })
            .collect();
        if changed {
            self.replace_all(next);
        }
        changed
    }

    /// Insert one element at an array position.
    pub fn insert_element_at(&mut self, element: Element, index: usize) {
        self.insert_elements_at(vec![element], index);
    }

    /// Insert elements at an array position, keying only the inserted ones.
    ///
    /// Positions past the end append.
    pub fn insert_elements_at(&mut self, elements: Vec<Element>, index: usize) {
        if elements.is_empty() {
            return;
        }
        let index = index.min(self.elements.len());
        let moved: HashSet<ElementId> = elements.iter().map(|e| e.id.clone()).collect();

        let mut next = Vec::with_capacity(self.elements.len() + elements.len());
        next.extend_from_slice(&self.elements[..index]);
        next.extend(elements);
        next.extend_from_slice(&self.elements[index..]);

        self.replace_all(reorder(next, &moved));
    }

    /// Register a callback invoked after every commit.
    #[must_use = "double subscription is a bug and must not be ignored"]
    pub fn subscribe(&mut self, callback: SceneCallback) -> Result<SubscriptionId, SubscriptionError> {
        if let Some((id, _)) = self.subscribers.iter().find(|(_, cb)| Rc::ptr_eq(cb, &callback)) {
            let err = SubscriptionError::AlreadySubscribed(*id);
            log::error!("{}", err);
            return Err(err);
        }
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, callback));
        Ok(id)
    }

    /// Remove a callback registered with [`Scene::subscribe`].
    #[must_use = "unsubscribing an unknown callback is a bug and must not be ignored"]
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), SubscriptionError> {
        let Some(pos) = self.subscribers.iter().position(|(sub, _)| *sub == id) else {
            let err = SubscriptionError::UnknownSubscription(id);
            log::error!("{}", err);
            return Err(err);
        };
        self.subscribers.remove(pos);
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
