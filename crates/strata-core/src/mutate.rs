//! Version stamping of element updates.
//!
//! A stamp is split in two steps: [`new_element_with`] is the pure state
//! transition, [`mutate_element`] applies it in place and tells the
//! [`ShapeCache`] collaborator to drop whatever it derived from the element.
//! Committing and notifying is left to the [`Scene`](crate::Scene), once per
//! logical batch.

use crate::element::{is_reserved_prop, Element, ElementId, ElementPatch};
use std::time::{SystemTime, UNIX_EPOCH};

/// Hook into the render/geometry layer's per-element caches.
pub trait ShapeCache {
    /// Forget anything cached for the element.
    fn invalidate(&mut self, id: &ElementId);
}

/// A cache that holds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoShapeCache;

impl ShapeCache for NoShapeCache {
    fn invalidate(&mut self, _id: &ElementId) {}
}

/// Generate a fresh change nonce.
pub fn random_nonce() -> u32 {
    rand::random()
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn merge_patch(element: &mut Element, patch: &ElementPatch) {
    if let Some(key) = &patch.order_key {
        element.order_key = Some(key.clone());
    }
    if let Some(is_deleted) = patch.is_deleted {
        element.is_deleted = is_deleted;
    }
    for (name, value) in &patch.props {
        if is_reserved_prop(name) {
            log::warn!("Ignoring reserved property {} for element {}", name, element.id);
        } else if value.is_null() {
            element.props.remove(name);
        } else {
            element.props.insert(name.clone(), value.clone());
        }
    }
}

fn bump(element: &mut Element) {
    element.version = element.version.wrapping_add(1);
    let previous = element.version_nonce;
    element.version_nonce = loop {
        let nonce = random_nonce();
        if nonce != previous {
            break nonce;
        }
    };
    element.updated = now_millis();
}

/// Produce the element that results from applying `patch`.
///
/// With `bump_version` the version is incremented and a new nonce drawn,
/// even for an empty patch.
pub fn new_element_with(element: &Element, patch: &ElementPatch, bump_version: bool) -> Element {
    let mut next = element.clone();
    merge_patch(&mut next, patch);
    if bump_version {
        bump(&mut next);
    }
    next
}

/// Apply `patch` to `element` in place and invalidate its cached shape.
pub fn mutate_element(
    element: &mut Element,
    patch: &ElementPatch,
    bump_version: bool,
    cache: &mut dyn ShapeCache,
) {
    merge_patch(element, patch);
    if bump_version {
        bump(element);
    }
    cache.invalidate(&element.id);
}
