//! Fractional order keys.
//!
//! [`key`] allocates new keys strictly between two bounds; [`sync`] keeps the
//! keys of an element array consistent with the array order, repairing only
//! what is broken.

pub mod key;
pub mod sync;

pub use key::{key_between, keys_between, AllocationError, AllocationResult, OrderKey, INTEGER_ZERO};
pub use sync::{compare, is_valid, normalize, order_by, reorder, validate_indices, InvalidIndicesError};
