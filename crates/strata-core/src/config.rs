//! Session configuration.

use serde::{Deserialize, Serialize};

/// Default number of undo states to keep.
pub const DEFAULT_MAX_HISTORY_ENTRIES: usize = 50;

/// Settings for one editing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of entries on the undo stack.
    pub max_history_entries: usize,
    /// Check every committed array for order key violations and log them.
    pub validate_indices: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_entries: DEFAULT_MAX_HISTORY_ENTRIES,
            validate_indices: cfg!(debug_assertions),
        }
    }
}

impl SessionConfig {
    /// Parse a configuration, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
