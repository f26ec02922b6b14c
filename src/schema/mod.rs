//! Schema model: the caller-defined shape of an ingested record.
//!
//! A [`Schema`] is an ordered list of [`SchemaField`]s plus repository-assigned metadata. Before
//! it is stored it is normalized ([`Schema::normalize`]) and checked by a
//! [`validator::SchemaValidator`]; the individual checks live on [`Schema`] itself and report a
//! plain `bool` so callers can compose them.

pub mod policy;
pub mod service;
pub mod validator;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestionResult;
use crate::types::SchemaId;

pub use policy::SchemaPolicy;
pub use service::SchemaService;
pub use validator::SchemaValidator;

/// One column of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field/column name.
    pub name: String,
    /// Declared type name, as supplied (lower-cased by [`Schema::normalize`]).
    #[serde(rename = "type")]
    pub field_type: String,
    /// Uploads must carry this column.
    #[serde(default)]
    pub required: bool,
    /// Values in this column must not repeat within an upload.
    #[serde(default)]
    pub unique: bool,
}

impl SchemaField {
    /// Create an optional, non-unique field.
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            required: false,
            unique: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A typed record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Assigned by the repository on creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SchemaId>,
    /// Ordered list of fields.
    pub fields: Vec<SchemaField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of a schema creation request: `{"fields": [{"name": .., "type": .., ..}]}`.
#[derive(Debug, Deserialize)]
struct CreateSchemaRequest {
    fields: Vec<SchemaField>,
}

impl Schema {
    /// Create an unsaved schema from fields.
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self {
            id: None,
            fields,
            created_at: None,
            updated_at: None,
        }
    }

    /// Decode a creation request body.
    ///
    /// `fields` is mandatory and each field needs a `name` and a `type`; `required` and `unique`
    /// default to `false`.
    pub fn from_request_json(body: &str) -> IngestionResult<Self> {
        let req: CreateSchemaRequest = serde_json::from_str(body)?;
        Ok(Self::new(req.fields))
    }

    /// Lower-case every field name and type in place.
    pub fn normalize(&mut self) {
        for field in &mut self.fields {
            field.name = field.name.to_lowercase();
            field.field_type = field.field_type.to_lowercase();
        }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Look up a field by exact name.
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Every field's type is in `policy.valid_types` (case-insensitive).
    pub fn has_valid_field_types(&self, policy: &SchemaPolicy) -> bool {
        self.fields.iter().all(|f| policy.is_valid_type(&f.field_type))
    }

    /// No two fields share a name.
    pub fn has_unique_field_names(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.fields.len());
        self.fields.iter().all(|f| seen.insert(f.name.as_str()))
    }

    /// No field uses a system-managed name.
    pub fn avoids_reserved_fields(&self, policy: &SchemaPolicy) -> bool {
        !self.fields.iter().any(|f| policy.is_reserved(&f.name))
    }

    /// Every name in `policy.required_fields` is declared.
    pub fn declares_required_fields(&self, policy: &SchemaPolicy) -> bool {
        let names: HashSet<&str> = self.field_names().collect();
        policy
            .required_fields
            .iter()
            .all(|r| names.contains(r.as_str()))
    }
}
