//! Strata Core Library
//!
//! Element ordering and versioning for a collaborative whiteboard: fractional
//! order keys, the scene store, and the undo/redo log.

pub mod config;
pub mod element;
pub mod fractional;
pub mod history;
pub mod mutate;
pub mod reconcile;
pub mod scene;
pub mod session;
pub mod zindex;

pub use config::SessionConfig;
pub use element::{Element, ElementId, ElementPatch, ViewState};
pub use fractional::{AllocationError, InvalidIndicesError, OrderKey, key_between, keys_between, normalize, reorder};
pub use history::{History, HistoryEntry, HistoryState, SnapshotError};
pub use mutate::{ShapeCache, mutate_element, new_element_with};
pub use reconcile::reconcile_elements;
pub use scene::{MutateOptions, Scene, SceneCallback, SubscriptionError, SubscriptionId};
pub use session::EditingSession;
pub use zindex::ZMove;
