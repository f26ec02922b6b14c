//! `lead-stream` loads lead records from CSV uploads into a store, validating every row against a
//! caller-defined [`schema::Schema`].
//!
//! Two services make up the pipeline:
//!
//! - [`schema::SchemaService`] normalizes, validates and stores schemas.
//! - [`ingestion::IngestionService`] decodes an upload against a stored schema, checks required
//!   columns and unique values, coerces every cell to its declared type and persists the whole
//!   file as one batch. A file with a single bad row stores nothing.
//!
//! Storage sits behind the [`repository::SchemaRepository`] and [`repository::LeadRepository`]
//! traits; [`repository::memory`] provides in-process implementations.
//!
//! ## Field types
//!
//! Schemas declare each field as one of `string`, `integer`, `boolean`, `date`, `time` or
//! `datetime`. `date`, `time` and `datetime` cells carry epoch-style integers.
//!
//! ## Upload format
//!
//! Comma-delimited text. The first non-comment line is the header, and any line whose first cell
//! starts with `#` is a comment. Header names are matched against schema fields exactly
//! (case-sensitive), while schema field names are lower-cased when the schema is saved.
//!
//! ## Quick example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use lead_stream::ingestion::{IngestRequest, IngestionService};
//! use lead_stream::repository::{InMemoryLeadRepository, InMemorySchemaRepository};
//! use lead_stream::schema::{Schema, SchemaField, SchemaService};
//!
//! # fn main() -> Result<(), lead_stream::IngestionError> {
//! let schemas = Arc::new(InMemorySchemaRepository::new());
//! let leads = Arc::new(InMemoryLeadRepository::new());
//!
//! let schema = SchemaService::new(schemas.clone()).validate_and_save(Schema::new(vec![
//!     SchemaField::new("email", "string").required().unique(),
//!     SchemaField::new("phone", "integer").required().unique(),
//!     SchemaField::new("name", "string"),
//! ]))?;
//! let schema_id = schema.id.expect("assigned on save").to_string();
//!
//! let upload = "email,phone,name\n# imported from the spring fair\nada@example.com,5550101,Ada\n";
//! let stats = IngestionService::new(schemas, leads.clone())
//!     .process_and_save(&IngestRequest::from_bytes(schema_id, upload))?;
//!
//! assert_eq!(stats.rows, 1);
//! assert_eq!(leads.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`schema`]: schema model, policy, validator and service
//! - [`ingestion`]: CSV decoding, type coercion and the ingestion orchestrator
//! - [`repository`]: storage traits and in-memory implementations
//! - [`types`]: identifiers, values and records
//! - [`error`]: the error type shared across the crate

pub mod error;
pub mod ingestion;
pub mod repository;
pub mod schema;
pub mod types;

pub use error::{ErrorCategory, IngestionError, IngestionResult};
