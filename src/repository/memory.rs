//! In-process repositories.
//!
//! These are used by tests and by embedders that do not need durable storage. The lead store
//! mirrors a database with unique indexes: a batch that collides with already-stored records (or
//! with itself) is rejected as a whole.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::debug;

use crate::error::{IngestionError, IngestionResult};
use crate::schema::Schema;
use crate::types::{Record, SchemaId};

use super::{LeadRepository, SchemaRepository};

/// Schema store keyed by [`SchemaId`].
#[derive(Debug, Default)]
pub struct InMemorySchemaRepository {
    schemas: Mutex<HashMap<SchemaId, Schema>>,
}

impl InMemorySchemaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored schemas.
    pub fn len(&self) -> usize {
        lock(&self.schemas).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SchemaRepository for InMemorySchemaRepository {
    fn create(&self, schema: &mut Schema) -> IngestionResult<()> {
        let now = Utc::now();
        let id = SchemaId::new();
        schema.id = Some(id);
        schema.created_at = Some(now);
        schema.updated_at = Some(now);

        lock(&self.schemas).insert(id, schema.clone());
        debug!(schema_id = %id, fields = schema.fields.len(), "schema stored");
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> IngestionResult<Schema> {
        let parsed = SchemaId::parse(id)?;
        lock(&self.schemas)
            .get(&parsed)
            .cloned()
            .ok_or_else(|| IngestionError::NotFound { id: id.to_owned() })
    }
}

/// Lead store with optional unique indexes on top-level fields.
#[derive(Debug)]
pub struct InMemoryLeadRepository {
    unique_fields: Vec<String>,
    state: Mutex<LeadState>,
}

#[derive(Debug, Default)]
struct LeadState {
    records: Vec<Record>,
    // (field, value key) pairs already taken.
    index: HashSet<(String, String)>,
    batch_sizes: Vec<usize>,
}

impl Default for InMemoryLeadRepository {
    /// Unique indexes on `email` and `telephone`, matching the production lead collection.
    fn default() -> Self {
        Self::with_unique_fields(["email", "telephone"])
    }
}

impl InMemoryLeadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store enforcing a unique index on each of `fields`.
    pub fn with_unique_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unique_fields: fields.into_iter().map(Into::into).collect(),
            state: Mutex::new(LeadState::default()),
        }
    }

    /// Create a store without unique indexes.
    pub fn without_indexes() -> Self {
        Self::with_unique_fields(Vec::<String>::new())
    }

    /// Snapshot of every stored record, in insertion order.
    pub fn records(&self) -> Vec<Record> {
        lock(&self.state).records.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of every batch accepted so far, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.state).batch_sizes.clone()
    }

    fn index_keys(&self, record: &Record) -> Vec<(String, String)> {
        self.unique_fields
            .iter()
            .filter_map(|field| {
                record
                    .get(field)
                    .map(|value| (field.clone(), format!("{value:?}")))
            })
            .collect()
    }
}

impl LeadRepository for InMemoryLeadRepository {
    fn create_many(&self, records: Vec<Record>) -> IngestionResult<()> {
        let mut state = lock(&self.state);

        let mut pending: HashSet<(String, String)> = HashSet::new();
        for record in &records {
            for key in self.index_keys(record) {
                if state.index.contains(&key) || !pending.insert(key.clone()) {
                    return Err(IngestionError::Conflict {
                        message: format!("duplicate key on index '{}': {}", key.0, key.1),
                    });
                }
            }
        }

        state.index.extend(pending);
        state.batch_sizes.push(records.len());
        state.records.extend(records);
        debug!(total = state.records.len(), "lead batch stored");
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
