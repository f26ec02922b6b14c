//! Business rules the validator and the orchestrator enforce.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IngestionResult;
use crate::types::{CREATED_AT_FIELD, UPDATED_AT_FIELD};

/// Validation tables for schemas and uploads.
///
/// [`Default`] reproduces the fixed rules every lead schema follows: `phone` and `email` are
/// mandatory, field types come from `{string, integer, boolean, date, time, datetime}` and the
/// timestamp columns are reserved. Tests and embedders can load an alternate policy from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaPolicy {
    /// Field names every schema must declare and every upload header must contain.
    pub required_fields: BTreeSet<String>,
    /// Allowed (lower-case) field type names.
    pub valid_types: BTreeSet<String>,
    /// Field names owned by the system and rejected in schema definitions.
    pub reserved_fields: BTreeSet<String>,
}

impl Default for SchemaPolicy {
    fn default() -> Self {
        Self {
            required_fields: set(&["phone", "email"]),
            valid_types: set(&["string", "integer", "boolean", "date", "time", "datetime"]),
            reserved_fields: set(&[CREATED_AT_FIELD, UPDATED_AT_FIELD]),
        }
    }
}

impl SchemaPolicy {
    /// Parse a policy from a JSON document. Missing keys fall back to the defaults.
    pub fn from_json_str(json: &str) -> IngestionResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a policy from a JSON file.
    pub fn from_json_path(path: impl AsRef<Path>) -> IngestionResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Whether `ty` is an allowed field type (case-insensitive).
    pub fn is_valid_type(&self, ty: &str) -> bool {
        self.valid_types.contains(&ty.to_lowercase())
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved_fields.contains(name)
    }
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
