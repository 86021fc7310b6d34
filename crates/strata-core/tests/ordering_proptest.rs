//! Property-based tests for order key allocation and repair.

use proptest::prelude::*;
use std::collections::HashSet;
use strata_core::fractional::{AllocationError, key_between, keys_between, normalize, reorder, validate_indices, OrderKey};
use strata_core::{Element, ElementId};

// =============================================================================
// Test helpers
// =============================================================================

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Build a sorted key list by repeatedly allocating at random positions.
fn build_keys(positions: &[f64]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for pct in positions {
        let pos = ((pct * keys.len() as f64) as usize).min(keys.len());
        let a = pos.checked_sub(1).map(|i| keys[i].as_str());
        let b = keys.get(pos).map(String::as_str);
        let key = key_between(a, b).unwrap().into_string();
        keys.insert(pos, key);
    }
    keys
}

/// Keys that must never survive normalization.
const MALFORMED: &[&str] = &["", "a", "a00", "zzz", "!!"];

#[derive(Clone, Debug)]
enum KeySlot {
    Pooled(f64),
    Malformed(usize),
    Missing,
}

fn arbitrary_slot() -> impl Strategy<Value = KeySlot> {
    prop_oneof![
        3 => (0.0..1.0f64).prop_map(KeySlot::Pooled),
        1 => (0..MALFORMED.len()).prop_map(KeySlot::Malformed),
        1 => Just(KeySlot::Missing),
    ]
}

fn element_for(i: usize, slot: &KeySlot, pool: &[String]) -> Element {
    let mut element = Element::with_id(format!("e{i}"));
    element.order_key = match slot {
        KeySlot::Pooled(pct) => {
            let pick = ((pct * pool.len() as f64) as usize).min(pool.len() - 1);
            Some(OrderKey::from(pool[pick].as_str()))
        }
        KeySlot::Malformed(which) => Some(OrderKey::from(MALFORMED[*which])),
        KeySlot::Missing => None,
    };
    element
}

fn ids(elements: &[Element]) -> Vec<ElementId> {
    elements.iter().map(|e| e.id.clone()).collect()
}

// =============================================================================
// Allocation properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Keys allocated at arbitrary positions stay sorted and well formed
    #[test]
    fn allocated_keys_are_sorted(positions in prop::collection::vec(0.0..=1.0f64, 1..60)) {
        let keys = build_keys(&positions);

        prop_assert_eq!(keys.len(), positions.len());
        for key in &keys {
            prop_assert!(OrderKey::parse(key.as_str()).is_ok(), "malformed key {}", key);
        }
        for pair in keys.windows(2) {
            prop_assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    /// keys_between fills a gap with exactly n increasing keys
    #[test]
    fn keys_between_fills_gap(
        positions in prop::collection::vec(0.0..=1.0f64, 2..30),
        gap_pct in 0.0..1.0f64,
        n in 0usize..20,
    ) {
        let keys = build_keys(&positions);
        let gap = ((gap_pct * (keys.len() - 1) as f64) as usize).min(keys.len() - 2);
        let (a, b) = (keys[gap].as_str(), keys[gap + 1].as_str());

        let fresh = keys_between(Some(a), Some(b), n).unwrap();
        prop_assert_eq!(fresh.len(), n);

        let mut previous = a;
        for key in &fresh {
            prop_assert!(previous < key.as_str());
            previous = key.as_str();
        }
        prop_assert!(previous < b || n == 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Bounds that are equal or inverted are rejected without a key
    #[test]
    fn inverted_bounds_are_rejected(
        positions in prop::collection::vec(0.0..=1.0f64, 1..40),
        hi_pct in 0.0..1.0f64,
        lo_pct in 0.0..=1.0f64,
        n in 1usize..10,
    ) {
        let keys = build_keys(&positions);
        let hi = ((hi_pct * keys.len() as f64) as usize).min(keys.len() - 1);
        let lo = ((lo_pct * (hi + 1) as f64) as usize).min(hi);
        let (a, b) = (keys[hi].as_str(), keys[lo].as_str());
        prop_assert!(a >= b);

        let single = matches!(key_between(Some(a), Some(b)), Err(AllocationError::InvalidBounds { .. }));
        prop_assert!(single);
        let many = matches!(keys_between(Some(a), Some(b), n), Err(AllocationError::InvalidBounds { .. }));
        prop_assert!(many);
    }
}

// =============================================================================
// Normalization properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// normalize keeps the array order and leaves strictly increasing keys
    #[test]
    fn normalize_repairs_in_place(
        positions in prop::collection::vec(0.0..=1.0f64, 1..20),
        slots in prop::collection::vec(arbitrary_slot(), 0..40),
    ) {
        init_logging();
        let pool = build_keys(&positions);
        let elements: Vec<Element> = slots.iter().enumerate().map(|(i, s)| element_for(i, s, &pool)).collect();

        let normalized = normalize(elements.clone());

        prop_assert_eq!(ids(&normalized), ids(&elements));
        prop_assert!(validate_indices(&normalized).is_ok());

        for (before, after) in elements.iter().zip(&normalized) {
            if before.order_key == after.order_key {
                prop_assert_eq!(before.version, after.version);
            } else {
                prop_assert_eq!(after.version, before.version + 1);
            }
        }
    }

    /// normalize changes nothing on an already valid array
    #[test]
    fn normalize_is_idempotent(
        positions in prop::collection::vec(0.0..=1.0f64, 1..20),
        slots in prop::collection::vec(arbitrary_slot(), 0..40),
    ) {
        init_logging();
        let pool = build_keys(&positions);
        let elements: Vec<Element> = slots.iter().enumerate().map(|(i, s)| element_for(i, s, &pool)).collect();

        let once = normalize(elements);
        let twice = normalize(once.clone());
        prop_assert_eq!(once, twice);
    }
}

// =============================================================================
// Reorder properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Moving one contiguous run re-keys exactly the moved elements
    #[test]
    fn reorder_touches_only_moved_run(
        positions in prop::collection::vec(0.0..=1.0f64, 2..40),
        start_pct in 0.0..1.0f64,
        len_pct in 0.0..=1.0f64,
        dest_pct in 0.0..=1.0f64,
    ) {
        init_logging();
        let keys = build_keys(&positions);
        let elements: Vec<Element> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| Element::with_id(format!("e{i}")).with_order_key(key.as_str()))
            .collect();

        let n = elements.len();
        let start = ((start_pct * n as f64) as usize).min(n - 1);
        let len = ((len_pct * (n - start) as f64) as usize).clamp(1, n - start);

        let mut rest = elements.clone();
        let run: Vec<Element> = rest.drain(start..start + len).collect();
        let dest = ((dest_pct * rest.len() as f64) as usize).min(rest.len());
        let moved: HashSet<ElementId> = run.iter().map(|e| e.id.clone()).collect();

        let mut next = rest;
        next.splice(dest..dest, run);
        let expected_ids = ids(&next);

        let reordered = reorder(next.clone(), &moved);

        prop_assert_eq!(ids(&reordered), expected_ids);
        prop_assert!(validate_indices(&reordered).is_ok());

        for (before, after) in next.iter().zip(&reordered) {
            if moved.contains(&before.id) {
                prop_assert_eq!(after.version, before.version + 1);
            } else {
                prop_assert_eq!(&after.order_key, &before.order_key);
                prop_assert_eq!(after.version, before.version);
            }
        }
    }
}
