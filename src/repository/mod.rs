//! Storage boundary consumed by the schema service and the ingestion orchestrator.
//!
//! Production deployments implement these traits over their database; [`memory`] provides
//! in-process implementations.

pub mod memory;

use crate::error::IngestionResult;
use crate::schema::Schema;
use crate::types::Record;

pub use memory::{InMemoryLeadRepository, InMemorySchemaRepository};

/// Schema storage.
pub trait SchemaRepository: Send + Sync {
    /// Persist `schema`, assigning its id and timestamps in place.
    fn create(&self, schema: &mut Schema) -> IngestionResult<()>;

    /// Fetch a schema by its string id.
    ///
    /// Fails with [`crate::IngestionError::MalformedId`] when `id` is not a valid identifier and
    /// with [`crate::IngestionError::NotFound`] when no schema has that id.
    fn find_by_id(&self, id: &str) -> IngestionResult<Schema>;
}

/// Lead record storage.
pub trait LeadRepository: Send + Sync {
    /// Insert a batch of records. Either every record is stored or none is.
    ///
    /// Fails with [`crate::IngestionError::Conflict`] when the batch collides with the store's
    /// unique index.
    fn create_many(&self, records: Vec<Record>) -> IngestionResult<()>;

    /// Insert a single record.
    fn create(&self, record: Record) -> IngestionResult<()> {
        self.create_many(vec![record])
    }
}
