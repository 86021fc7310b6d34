//! Keeping order keys in sync with the array order.
//!
//! The array is the cached order of a scene; keys are what peers and storage
//! merge on. Both passes here only ever touch the keys that need it, so
//! already-valid keys stay byte-identical across edits.

use super::key::{keys_between, AllocationError, OrderKey};
use crate::element::{Element, ElementId, ElementPatch};
use crate::mutate::new_element_with;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::Range;
use thiserror::Error;

/// Order keys that break the strictly-increasing invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Order key invariant violated at {} position(s): {}", .violations.len(), .violations.join("; "))]
pub struct InvalidIndicesError {
    /// One line per offending position: `position:key:id:deleted:version:nonce`.
    pub violations: Vec<String>,
}

fn non_empty(key: Option<&str>) -> Option<&str> {
    key.filter(|k| !k.is_empty())
}

/// Whether `key` fits strictly between its neighbors.
///
/// A missing neighbor is no constraint; a missing or empty key is never valid.
pub fn is_valid(key: Option<&str>, predecessor: Option<&str>, successor: Option<&str>) -> bool {
    let Some(key) = non_empty(key) else {
        return false;
    };
    non_empty(predecessor).is_none_or(|p| p < key) && non_empty(successor).is_none_or(|s| key < s)
}

/// The key of an element if it can serve as an allocation bound.
fn usable_key(element: &Element) -> Option<&str> {
    element
        .order_key
        .as_ref()
        .filter(|key| key.is_well_formed())
        .map(OrderKey::as_str)
}

/// Compare two elements by order key, then by id.
///
/// Elements without a key sort after every keyed element, by id.
pub fn compare(a: &Element, b: &Element) -> Ordering {
    match (&a.order_key, &b.order_key) {
        (Some(ka), Some(kb)) => ka.cmp(kb).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    }
}

/// Stable sort by order key with id as tie-breaker.
pub fn order_by(elements: &mut [Element]) {
    elements.sort_by(compare);
}

/// Repair every key that is out of order with respect to its predecessors.
///
/// Elements are never moved: only `order_key` changes, and repaired elements
/// get a version bump. A key is kept when it is well formed and above the
/// key kept (or assigned) just before it. Each maximal run of failing
/// elements receives fresh keys between the last kept key and the next
/// original key above it.
pub fn normalize(mut elements: Vec<Element>) -> Vec<Element> {
    let mut lower: Option<OrderKey> = None;
    let mut i = 0;

    while i < elements.len() {
        let lower_str = lower.as_ref().map(OrderKey::as_str);
        if is_valid(usable_key(&elements[i]), lower_str, None) {
            lower = elements[i].order_key.clone();
            i += 1;
            continue;
        }

        let end = (i + 1..elements.len())
            .find(|&j| usable_key(&elements[j]).is_some_and(|k| lower_str.is_none_or(|l| l < k)))
            .unwrap_or(elements.len());
        let upper = elements.get(end).and_then(usable_key);

        match keys_between(lower_str, upper, end - i) {
            Ok(fresh) => {
                for (element, key) in elements[i..end].iter_mut().zip(fresh) {
                    *element = new_element_with(element, &ElementPatch::new().order_key(key), true);
                }
                lower = elements[end - 1].order_key.clone();
            }
            Err(err @ AllocationError::Exhausted) => {
                log::warn!("Order key space exhausted, keeping {} key(s) for now: {}", end - i, err);
            }
            Err(err @ (AllocationError::InvalidBounds { .. } | AllocationError::InvalidKey(_))) => {
                log::warn!("Failed to repair order keys {}..{}: {}", i, end, err);
            }
        }
        i = end;
    }

    elements
}

/// Contiguous runs of moved elements in the already repositioned array.
fn moved_runs(elements: &[Element], moved: &HashSet<ElementId>) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < elements.len() {
        if moved.contains(&elements[i].id) {
            let start = i;
            while i < elements.len() && moved.contains(&elements[i].id) {
                i += 1;
            }
            runs.push(start..i);
        } else {
            i += 1;
        }
    }
    runs
}

fn keys_strictly_increasing<'a>(keys: impl Iterator<Item = Option<&'a str>>) -> bool {
    let mut previous: Option<&str> = None;
    for key in keys {
        if !is_valid(key, previous, None) {
            return false;
        }
        previous = key;
    }
    true
}

/// Assign fresh keys to elements that were explicitly moved.
///
/// `elements` must already be in the target order. Every run of moved
/// elements gets exactly `run.len()` new keys between its current neighbors;
/// everything else keeps its key. If a run cannot be keyed, or the result
/// would still be out of order, this falls back to [`normalize`].
pub fn reorder(elements: Vec<Element>, moved: &HashSet<ElementId>) -> Vec<Element> {
    let mut updates: Vec<(usize, OrderKey)> = Vec::new();

    for run in moved_runs(&elements, moved) {
        let lower = run.start.checked_sub(1).and_then(|j| elements[j].key());
        let upper = elements.get(run.end).and_then(Element::key);
        match keys_between(lower, upper, run.len()) {
            Ok(keys) => updates.extend(run.zip(keys)),
            Err(err) => {
                log::debug!("Falling back to normalize after reorder failure: {}", err);
                return normalize(elements);
            }
        }
    }

    let mut candidate: Vec<Option<&str>> = elements.iter().map(Element::key).collect();
    for (index, key) in &updates {
        candidate[*index] = Some(key.as_str());
    }
    if !keys_strictly_increasing(candidate.into_iter()) {
        log::debug!("Reordered keys still out of order, falling back to normalize");
        return normalize(elements);
    }

    let mut elements = elements;
    for (index, key) in updates {
        let element = &mut elements[index];
        *element = new_element_with(element, &ElementPatch::new().order_key(key), true);
    }
    elements
}

/// Check that every element's key fits between its array neighbors.
pub fn validate_indices(elements: &[Element]) -> Result<(), InvalidIndicesError> {
    let violations: Vec<String> = elements
        .iter()
        .enumerate()
        .filter(|&(i, element)| {
            let predecessor = i.checked_sub(1).and_then(|j| elements[j].key());
            let successor = elements.get(i + 1).and_then(Element::key);
            !is_valid(element.key(), predecessor, successor)
        })
        .map(|(i, e)| {
            format!(
                "{}:{}:{}:{}:{}:{}",
                i,
                e.key().unwrap_or("-"),
                e.id,
                e.is_deleted,
                e.version,
                e.version_nonce
            )
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(InvalidIndicesError { violations })
    }
}
