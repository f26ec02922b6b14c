//! Upload ingestion.
//!
//! Most callers should use [`IngestionService::process_and_save`] (from [`unified`]) which:
//!
//! - loads the target schema from a [`crate::repository::SchemaRepository`]
//! - decodes the upload with [`csv::RecordDecoder`] and validates header and rows
//! - persists all records in one batch, or none of them
//! - optionally reports success/failure/alerts to an [`IngestionObserver`]

pub mod csv;
pub mod observability;
pub mod unified;

pub use csv::{decode_csv, value_from_type, DecodedRow, RecordDecoder};
pub use observability::{
    CompositeObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    TracingObserver,
};
pub use unified::{validate_headers, IngestRequest, IngestionOptions, IngestionService, UploadSource};
