//! Z-order gestures.
//!
//! Each gesture repositions the array and then hands the selection to
//! [`reorder`], so only the moved elements get new keys. A gesture that
//! leaves the array order as it was changes nothing.

use crate::element::{Element, ElementId};
use crate::fractional::reorder;
use std::collections::HashSet;
use std::ops::Range;

/// A z-order move applied to a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZMove {
    /// One visible step towards the back.
    Backward,
    /// One visible step towards the front.
    Forward,
    /// All the way to the back.
    ToBack,
    /// All the way to the front.
    ToFront,
}

/// Apply a z-order move and re-key the selection.
pub fn move_elements(elements: &[Element], selected: &HashSet<ElementId>, mv: ZMove) -> Vec<Element> {
    match mv {
        ZMove::Backward => move_one_left(elements, selected),
        ZMove::Forward => move_one_right(elements, selected),
        ZMove::ToBack => move_all_left(elements, selected),
        ZMove::ToFront => move_all_right(elements, selected),
    }
}

fn selected_runs(elements: &[Element], selected: &HashSet<ElementId>) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, element) in elements.iter().enumerate() {
        match (selected.contains(&element.id), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..elements.len());
    }
    runs
}

/// Re-key the selection unless the repositioning was a no-op.
fn finish(elements: &[Element], next: Vec<Element>, selected: &HashSet<ElementId>) -> Vec<Element> {
    let unchanged = next.len() == elements.len() && next.iter().zip(elements).all(|(a, b)| a.id == b.id);
    if unchanged {
        return next;
    }
    reorder(next, selected)
}

fn is_target(element: &Element, selected: &HashSet<ElementId>) -> bool {
    !element.is_deleted && !selected.contains(&element.id)
}

/// Move each selected run below the nearest visible element beneath it.
pub fn move_one_left(elements: &[Element], selected: &HashSet<ElementId>) -> Vec<Element> {
    let mut next = elements.to_vec();
    for run in selected_runs(&next, selected) {
        let Some(target) = (0..run.start).rev().find(|&j| is_target(&next[j], selected)) else {
            continue;
        };
        next[target..run.end].rotate_right(run.len());
    }
    finish(elements, next, selected)
}

/// Move each selected run above the nearest visible element above it.
pub fn move_one_right(elements: &[Element], selected: &HashSet<ElementId>) -> Vec<Element> {
    let mut next = elements.to_vec();
    for run in selected_runs(&next, selected).into_iter().rev() {
        let Some(target) = (run.end..next.len()).find(|&j| is_target(&next[j], selected)) else {
            continue;
        };
        next[run.start..=target].rotate_left(run.len());
    }
    finish(elements, next, selected)
}

/// Move the selection to the back, keeping its relative order.
pub fn move_all_left(elements: &[Element], selected: &HashSet<ElementId>) -> Vec<Element> {
    let (mut next, rest): (Vec<Element>, Vec<Element>) =
        elements.iter().cloned().partition(|e| selected.contains(&e.id));
    next.extend(rest);
    finish(elements, next, selected)
}

/// Move the selection to the front, keeping its relative order.
pub fn move_all_right(elements: &[Element], selected: &HashSet<ElementId>) -> Vec<Element> {
    let (moved, mut next): (Vec<Element>, Vec<Element>) =
        elements.iter().cloned().partition(|e| selected.contains(&e.id));
    next.extend(moved);
    finish(elements, next, selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fractional::validate_indices;

    fn scene_elements() -> Vec<Element> {
        ["a0", "a1", "a2", "a3"]
            .iter()
            .zip(["a", "b", "c", "d"])
            .map(|(key, id)| Element::with_id(id).with_order_key(*key))
            .collect()
    }

    fn select(ids: &[&str]) -> HashSet<ElementId> {
        ids.iter().map(|&id| ElementId::from(id)).collect()
    }

    fn ids(elements: &[Element]) -> Vec<&str> {
        elements.iter().map(|e| e.id.as_str()).collect()
    }

    fn key<'a>(elements: &'a [Element], id: &str) -> &'a str {
        elements.iter().find(|e| e.id.as_str() == id).and_then(Element::key).unwrap()
    }

    #[test]
    fn test_bring_forward() {
        let next = move_one_right(&scene_elements(), &select(&["b"]));

        assert_eq!(ids(&next), vec!["a", "c", "b", "d"]);
        assert!("a2" < key(&next, "b") && key(&next, "b") < "a3");
        assert_eq!(key(&next, "a"), "a0");
        assert_eq!(key(&next, "c"), "a2");
        assert_eq!(key(&next, "d"), "a3");
    }

    #[test]
    fn test_send_backward() {
        let next = move_one_left(&scene_elements(), &select(&["c", "d"]));

        assert_eq!(ids(&next), vec!["a", "c", "d", "b"]);
        assert_eq!(key(&next, "b"), "a1");
        assert!(validate_indices(&next).is_ok());
    }

    #[test]
    fn test_forward_at_front_is_noop() {
        let next = move_one_right(&scene_elements(), &select(&["d"]));
        assert_eq!(ids(&next), vec!["a", "b", "c", "d"]);
        assert_eq!(key(&next, "d"), "a3");
    }

    #[test]
    fn test_noop_moves_keep_keys() {
        let mut elements = scene_elements();
        elements[3].order_key = Some("a5".into());

        for (mv, id) in [(ZMove::Forward, "d"), (ZMove::ToFront, "d"), (ZMove::Backward, "a"), (ZMove::ToBack, "a")] {
            let next = move_elements(&elements, &select(&[id]), mv);
            assert_eq!(next, elements, "{:?} of {}", mv, id);
        }
        assert_eq!(key(&move_one_right(&elements, &select(&["d"])), "d"), "a5");
    }

    #[test]
    fn test_forward_skips_tombstones() {
        let mut elements = scene_elements();
        elements[2].is_deleted = true;

        let next = move_one_right(&elements, &select(&["b"]));
        assert_eq!(ids(&next), vec!["a", "c", "d", "b"]);
        assert!(key(&next, "b") > "a3");
    }

    #[test]
    fn test_to_front_and_back() {
        let front = move_elements(&scene_elements(), &select(&["a", "c"]), ZMove::ToFront);
        assert_eq!(ids(&front), vec!["b", "d", "a", "c"]);
        assert_eq!(key(&front, "b"), "a1");
        assert_eq!(key(&front, "d"), "a3");
        assert!(validate_indices(&front).is_ok());

        let back = move_elements(&scene_elements(), &select(&["d"]), ZMove::ToBack);
        assert_eq!(ids(&back), vec!["d", "a", "b", "c"]);
        assert!(key(&back, "d") < "a0");
    }
}
