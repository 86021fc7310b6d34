//! Element data model.

use crate::fractional::OrderKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ElementId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire names owned by [`Element`] itself; a payload property may not use them.
pub const RESERVED_PROPS: &[&str] = &["id", "version", "versionNonce", "orderKey", "isDeleted", "updated"];

/// Whether `name` collides with a field of the element wire form.
pub fn is_reserved_prop(name: &str) -> bool {
    RESERVED_PROPS.contains(&name)
}

/// A drawable element as seen by the ordering core.
///
/// Everything beyond the ordering and versioning fields is carried in
/// `props` and never interpreted here. `orderKey` and `isDeleted` are part of
/// the wire format other peers merge on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Immutable identifier.
    pub id: ElementId,
    /// Bumped on every committed mutation.
    #[serde(default)]
    pub version: u32,
    /// Regenerated together with `version`.
    #[serde(default)]
    pub version_nonce: u32,
    /// Position in the scene. Absent only before first insertion.
    #[serde(default)]
    pub order_key: Option<OrderKey>,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Milliseconds since the Unix epoch of the last bumped mutation.
    #[serde(default)]
    pub updated: u64,
    /// Opaque element payload.
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

impl Element {
    /// Create a new element with a random id and no order key.
    pub fn new() -> Self {
        Self::with_id(ElementId::new())
    }

    /// Create a new element with the given id and no order key.
    pub fn with_id(id: impl Into<ElementId>) -> Self {
        Self {
            id: id.into(),
            version: 1,
            version_nonce: crate::mutate::random_nonce(),
            order_key: None,
            is_deleted: false,
            updated: crate::mutate::now_millis(),
            props: Map::new(),
        }
    }

    /// Builder-style helper to set the order key.
    pub fn with_order_key(mut self, key: impl Into<OrderKey>) -> Self {
        self.order_key = Some(key.into());
        self
    }

    /// Builder-style helper to set a payload property.
    ///
    /// Reserved names are ignored with a warning.
    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if is_reserved_prop(&name) {
            log::warn!("Ignoring reserved property {} on element {}", name, self.id);
        } else {
            self.props.insert(name, value.into());
        }
        self
    }

    /// The order key as a string slice.
    pub fn key(&self) -> Option<&str> {
        self.order_key.as_ref().map(OrderKey::as_str)
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }
}

impl Default for Element {
    fn default() -> Self {
        Self::new()
    }
}

/// A partial update applied through the version stamper.
///
/// `None` leaves a field untouched. Property entries are merged shallowly;
/// `Value::Null` removes the property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementPatch {
    pub order_key: Option<OrderKey>,
    pub is_deleted: Option<bool>,
    pub props: Map<String, Value>,
}

impl ElementPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_key(mut self, key: impl Into<OrderKey>) -> Self {
        self.order_key = Some(key.into());
        self
    }

    pub fn deleted(mut self, is_deleted: bool) -> Self {
        self.is_deleted = Some(is_deleted);
        self
    }

    /// Set a payload property. Reserved names are ignored with a warning.
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if is_reserved_prop(&name) {
            log::warn!("Ignoring reserved property {} in patch", name);
        } else {
            self.props.insert(name, value.into());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_key.is_none() && self.is_deleted.is_none() && self.props.is_empty()
    }
}

/// View context captured alongside history snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    /// Currently selected elements.
    #[serde(default)]
    pub selected_element_ids: BTreeSet<ElementId>,
    /// Group being edited, if any.
    #[serde(default)]
    pub editing_group_id: Option<String>,
}
