//! Merging foreign element updates into the local array.

use crate::element::{Element, ElementId};
use crate::fractional::{normalize, order_by};
use std::collections::HashMap;

/// Whether the local copy wins over the remote one.
///
/// Higher version wins; on a tie the lower nonce wins, which both peers
/// agree on without coordination.
pub fn should_discard_remote(local: &Element, remote: &Element) -> bool {
    local.version > remote.version
        || (local.version == remote.version && local.version_nonce <= remote.version_nonce)
}

/// Merge `remote` into `local`.
///
/// The union of both lists keeps one copy per id, is ordered by order key
/// and normalized. Swapping the arguments yields the same id order.
pub fn reconcile_elements(local: &[Element], remote: &[Element]) -> Vec<Element> {
    let local_by_id: HashMap<&ElementId, &Element> = local.iter().map(|e| (&e.id, e)).collect();
    let mut merged: HashMap<&ElementId, &Element> = HashMap::with_capacity(local.len() + remote.len());

    for element in local {
        merged.insert(&element.id, element);
    }
    for element in remote {
        match local_by_id.get(&element.id) {
            Some(ours) if should_discard_remote(ours, element) => {}
            _ => {
                merged.insert(&element.id, element);
            }
        }
    }

    let mut reconciled: Vec<Element> = merged.into_values().cloned().collect();
    order_by(&mut reconciled);
    normalize(reconciled)
}
