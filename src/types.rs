//! Core data types shared by the schema model, the decoder and the repositories.
//!
//! Ingestion turns each data row of an upload into a [`Record`]: an ordered list of named
//! [`Value`]s tagged with the owning [`SchemaId`] and system timestamps.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{IngestionError, IngestionResult};

/// Name of the record field referencing the owning schema.
pub const SCHEMA_ID_FIELD: &str = "schema_id";
/// Name of the system-managed creation timestamp.
pub const CREATED_AT_FIELD: &str = "created_at";
/// Name of the system-managed update timestamp.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Repository-assigned schema identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(Uuid);

impl SchemaId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier from its string form.
    ///
    /// Fails with [`IngestionError::MalformedId`] when `raw` is not a valid identifier.
    pub fn parse(raw: &str) -> IngestionResult<Self> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|source| IngestionError::MalformedId {
                id: raw.to_owned(),
                source,
            })
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SchemaId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SchemaId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for SchemaId {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A single typed value in a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// UTF-8 string, stored verbatim.
    String(String),
    /// 64-bit signed integer. Also carries `date`/`time`/`datetime` cells (epoch-style numbers).
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// Boolean.
    Boolean(bool),
    /// Reference to the owning schema.
    SchemaRef(SchemaId),
    /// System-managed timestamp.
    Timestamp(DateTime<Utc>),
}

/// One ingested data row.
///
/// Field order is `schema_id`, the row's cells in header order, then `created_at` and
/// `updated_at`. Records are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Build a record for `schema_id` from already-coerced cells.
    ///
    /// `now` is used for both `created_at` and `updated_at`.
    pub fn new(schema_id: SchemaId, cells: Vec<(String, Value)>, now: DateTime<Utc>) -> Self {
        let mut fields = Vec::with_capacity(cells.len() + 3);
        fields.push((SCHEMA_ID_FIELD.to_string(), Value::SchemaRef(schema_id)));
        fields.extend(cells);
        fields.push((CREATED_AT_FIELD.to_string(), Value::Timestamp(now)));
        fields.push((UPDATED_AT_FIELD.to_string(), Value::Timestamp(now)));
        Self { fields }
    }

    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Iterate `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields, including the system-managed ones.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn schema_id(&self) -> Option<SchemaId> {
        match self.get(SCHEMA_ID_FIELD) {
            Some(Value::SchemaRef(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(CREATED_AT_FIELD)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(UPDATED_AT_FIELD)
    }

    fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.get(name) {
            Some(Value::Timestamp(ts)) => Some(*ts),
            _ => None,
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
