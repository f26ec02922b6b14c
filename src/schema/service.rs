use std::io;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{IngestionError, IngestionResult};
use crate::repository::SchemaRepository;

use super::{Schema, SchemaPolicy, SchemaValidator};

/// Creates schemas: normalize, validate, persist, then re-read what was stored.
pub struct SchemaService {
    repository: Arc<dyn SchemaRepository>,
    validator: SchemaValidator,
}

impl SchemaService {
    /// Create a service enforcing the default [`SchemaPolicy`].
    pub fn new(repository: Arc<dyn SchemaRepository>) -> Self {
        Self::with_policy(repository, SchemaPolicy::default())
    }

    /// Create a service enforcing `policy`.
    ///
    /// Pass the same `Arc` to [`IngestionOptions::policy`](crate::ingestion::IngestionOptions)
    /// so schemas are created and uploads are checked under one set of identity fields.
    pub fn with_policy(
        repository: Arc<dyn SchemaRepository>,
        policy: impl Into<Arc<SchemaPolicy>>,
    ) -> Self {
        Self {
            repository,
            validator: SchemaValidator::new(policy),
        }
    }

    pub fn policy(&self) -> &Arc<SchemaPolicy> {
        self.validator.shared_policy()
    }

    /// Normalize and validate `schema`, store it, and return the stored copy.
    ///
    /// The returned schema is fetched back from the repository so it carries the assigned id
    /// and timestamps exactly as persisted.
    pub fn validate_and_save(&self, mut schema: Schema) -> IngestionResult<Schema> {
        if let Err(e) = self.validator.normalize_and_validate(&mut schema) {
            warn!(error = %e, "schema rejected");
            return Err(e);
        }

        self.repository.create(&mut schema)?;
        let id = schema
            .id
            .ok_or_else(|| IngestionError::Io(io::Error::other("schema repository assigned no id")))?;

        let stored = self.repository.find_by_id(&id.to_string())?;
        info!(schema_id = %id, fields = stored.fields.len(), "schema created");
        Ok(stored)
    }

    /// Decode a creation request body (see [`Schema::from_request_json`]) and save it.
    pub fn create_from_json(&self, body: &str) -> IngestionResult<Schema> {
        let schema = Schema::from_request_json(body)?;
        self.validate_and_save(schema)
    }
}
