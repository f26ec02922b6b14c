//! Ingestion orchestrator.
//!
//! [`IngestionService::process_and_save`] loads a schema, decodes an upload against it and hands
//! the resulting records to the lead repository as one batch:
//!
//! 1. fetch the schema by id
//! 2. open the upload and read its header
//! 3. check the header: identity fields, schema-required fields, no duplicate columns
//! 4. stream the rows, rejecting repeated values in unique columns
//! 5. coerce every cell and build one [`Record`] per row
//! 6. persist the whole batch with a single `create_many`
//!
//! Any failure aborts the call before step 6, so nothing from a rejected upload is stored.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{IngestionError, IngestionResult};
use crate::repository::{LeadRepository, SchemaRepository};
use crate::schema::{Schema, SchemaPolicy};
use crate::types::{Record, SchemaId};

use super::csv::{coerce_cell, DecodedRow, RecordDecoder};
use super::observability::{IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};

/// Where the uploaded file content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// Content already held in memory (e.g. a multipart body).
    Bytes(Vec<u8>),
    /// A file on disk, opened for the duration of the ingestion call.
    Path(PathBuf),
}

impl UploadSource {
    fn open(&self) -> IngestionResult<Box<dyn Read + '_>> {
        match self {
            UploadSource::Bytes(bytes) => Ok(Box::new(bytes.as_slice())),
            UploadSource::Path(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
        }
    }

    fn describe(&self) -> String {
        match self {
            UploadSource::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            UploadSource::Path(path) => path.display().to_string(),
        }
    }
}

/// An upload to ingest against a stored schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    /// Id of the schema the rows must conform to.
    pub schema_id: String,
    pub source: UploadSource,
}

impl IngestRequest {
    pub fn from_bytes(schema_id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            schema_id: schema_id.into(),
            source: UploadSource::Bytes(bytes.into()),
        }
    }

    pub fn from_path(schema_id: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            schema_id: schema_id.into(),
            source: UploadSource::Path(path.as_ref().to_path_buf()),
        }
    }
}

/// Options controlling ingestion behavior.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct IngestionOptions {
    /// Identity fields every upload header must contain.
    ///
    /// Share this with the [`SchemaService`](crate::schema::SchemaService) that creates the
    /// schemas, or uploads are checked against different identity fields than schemas were.
    pub policy: Arc<SchemaPolicy>,
    /// Reject data rows shorter than the header. Rows longer than the header are always rejected.
    pub strict_column_count: bool,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("policy", &self.policy)
            .field("strict_column_count", &self.strict_column_count)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            policy: Arc::new(SchemaPolicy::default()),
            strict_column_count: false,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// Bulk-loads uploads into the lead repository.
pub struct IngestionService {
    schemas: Arc<dyn SchemaRepository>,
    leads: Arc<dyn LeadRepository>,
    options: IngestionOptions,
}

impl IngestionService {
    pub fn new(schemas: Arc<dyn SchemaRepository>, leads: Arc<dyn LeadRepository>) -> Self {
        Self::with_options(schemas, leads, IngestionOptions::default())
    }

    pub fn with_options(
        schemas: Arc<dyn SchemaRepository>,
        leads: Arc<dyn LeadRepository>,
        options: IngestionOptions,
    ) -> Self {
        Self {
            schemas,
            leads,
            options,
        }
    }

    pub fn options(&self) -> &IngestionOptions {
        &self.options
    }

    /// Validate `request` against its schema and persist every row, or nothing.
    ///
    /// When an observer is configured, this function reports:
    ///
    /// - `on_success` on success, with the number of persisted records
    /// - `on_failure` on failure, with a computed severity
    /// - `on_alert` on failure when the computed severity is >= `alert_at_or_above`
    pub fn process_and_save(&self, request: &IngestRequest) -> IngestionResult<IngestionStats> {
        let result = self.ingest(request);

        if let Some(obs) = self.options.observer.as_ref() {
            let ctx = IngestionContext {
                schema_id: request.schema_id.clone(),
                source: request.source.describe(),
            };
            match &result {
                Ok(stats) => obs.on_success(&ctx, *stats),
                Err(e) => {
                    let sev = IngestionSeverity::for_error(e);
                    obs.on_failure(&ctx, sev, e);
                    if sev >= self.options.alert_at_or_above {
                        obs.on_alert(&ctx, sev, e);
                    }
                }
            }
        }

        result
    }

    fn ingest(&self, request: &IngestRequest) -> IngestionResult<IngestionStats> {
        let schema = self.schemas.find_by_id(&request.schema_id)?;
        let schema_id = schema
            .id
            .ok_or_else(|| IngestionError::Io(io::Error::other("stored schema has no id")))?;

        let batch = {
            let mut decoder = RecordDecoder::new(request.source.open()?);
            let headers = decoder.read_headers()?;
            debug!(%schema_id, ?headers, "upload header read");
            validate_headers(&headers, &schema, &self.options.policy)?;
            self.build_batch(schema_id, &schema, &headers, &mut decoder)?
        };

        let rows = batch.len();
        self.leads.create_many(batch)?;
        info!(%schema_id, rows, "upload persisted");
        Ok(IngestionStats { rows })
    }

    fn build_batch<R: Read>(
        &self,
        schema_id: SchemaId,
        schema: &Schema,
        headers: &[String],
        decoder: &mut RecordDecoder<R>,
    ) -> IngestionResult<Vec<Record>> {
        let types: HashMap<&str, &str> = schema
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.field_type.as_str()))
            .collect();
        let mut seen = UniqueValues::for_schema(schema);
        let mut batch = Vec::new();

        while let Some(row) = decoder.next_row()? {
            self.check_column_count(headers, &row)?;
            seen.observe(headers, &row.cells)?;
            batch.push(build_record(schema_id, headers, &row, &types)?);
        }

        Ok(batch)
    }

    fn check_column_count(&self, headers: &[String], row: &DecodedRow) -> IngestionResult<()> {
        let (got, want) = (row.cells.len(), headers.len());
        if got > want || (got < want && self.options.strict_column_count) {
            return Err(IngestionError::invalid_value(format!(
                "row {} has {got} columns, header has {want}",
                row.line
            )));
        }
        if got < want {
            warn!(line = row.line, got, want, "short row; missing columns are left out");
        }
        Ok(())
    }
}

/// Per-upload record of values already seen in each unique column.
struct UniqueValues<'a> {
    by_field: HashMap<&'a str, HashSet<String>>,
}

impl<'a> UniqueValues<'a> {
    fn for_schema(schema: &'a Schema) -> Self {
        let by_field = schema
            .fields
            .iter()
            .filter(|f| f.unique)
            .map(|f| (f.name.as_str(), HashSet::new()))
            .collect();
        Self { by_field }
    }

    fn observe(&mut self, headers: &[String], cells: &[String]) -> IngestionResult<()> {
        for (header, value) in headers.iter().zip(cells) {
            if let Some(values) = self.by_field.get_mut(header.as_str()) {
                if !values.insert(value.clone()) {
                    return Err(IngestionError::DuplicatedValue {
                        field: header.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn build_record(
    schema_id: SchemaId,
    headers: &[String],
    row: &DecodedRow,
    types: &HashMap<&str, &str>,
) -> IngestionResult<Record> {
    let now = Utc::now();
    let cells = headers
        .iter()
        .zip(&row.cells)
        .map(|(header, raw)| {
            let declared = types.get(header.as_str()).copied();
            coerce_cell(row.line, header, declared, raw).map(|v| (header.clone(), v))
        })
        .collect::<IngestionResult<Vec<_>>>()?;
    Ok(Record::new(schema_id, cells, now))
}

/// Check an upload header against the policy and the schema.
///
/// Header names are compared case-sensitively.
///
/// - every policy identity field is present → else [`IngestionError::RequiredFieldsMissing`]
/// - every schema field marked `required` is present → else
///   [`IngestionError::RequiredFieldsMissing`]
/// - no column name repeats → else [`IngestionError::DuplicatedFields`]
pub fn validate_headers(
    headers: &[String],
    schema: &Schema,
    policy: &SchemaPolicy,
) -> IngestionResult<()> {
    let present: HashSet<&str> = headers.iter().map(String::as_str).collect();

    let missing_identity: Vec<String> = policy
        .required_fields
        .iter()
        .filter(|name| !present.contains(name.as_str()))
        .cloned()
        .collect();
    if !missing_identity.is_empty() {
        return Err(IngestionError::RequiredFieldsMissing {
            missing: missing_identity,
        });
    }

    let missing_required: Vec<String> = schema
        .fields
        .iter()
        .filter(|f| f.required && !present.contains(f.name.as_str()))
        .map(|f| f.name.clone())
        .collect();
    if !missing_required.is_empty() {
        return Err(IngestionError::RequiredFieldsMissing {
            missing: missing_required,
        });
    }

    if let Some(field) = first_duplicate(headers) {
        return Err(IngestionError::DuplicatedFields {
            field: field.to_owned(),
        });
    }

    Ok(())
}

fn first_duplicate(headers: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(headers.len());
    headers
        .iter()
        .map(String::as_str)
        .find(|h| !seen.insert(*h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaField;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn lead_schema() -> Schema {
        Schema::new(vec![
            SchemaField::new("email", "string").required().unique(),
            SchemaField::new("phone", "integer").required().unique(),
            SchemaField::new("company", "string").required(),
        ])
    }

    #[test]
    fn identity_fields_are_checked_first() {
        let err = validate_headers(&headers(&["email", "company"]), &lead_schema(), &SchemaPolicy::default())
            .unwrap_err();
        assert!(matches!(err, IngestionError::RequiredFieldsMissing { ref missing } if missing == &["phone"]));
    }

    #[test]
    fn schema_required_fields_use_the_same_error() {
        let err = validate_headers(&headers(&["email", "phone"]), &lead_schema(), &SchemaPolicy::default())
            .unwrap_err();
        assert!(matches!(err, IngestionError::RequiredFieldsMissing { ref missing } if missing == &["company"]));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = validate_headers(
            &headers(&["email", "phone", "company", "email"]),
            &lead_schema(),
            &SchemaPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestionError::DuplicatedFields { ref field } if field == "email"));
    }

    #[test]
    fn header_names_are_case_sensitive() {
        let err = validate_headers(
            &headers(&["Email", "phone", "company"]),
            &lead_schema(),
            &SchemaPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestionError::RequiredFieldsMissing { .. }));
    }

    #[test]
    fn unique_tracker_only_watches_unique_columns() {
        let schema = lead_schema();
        let mut seen = UniqueValues::for_schema(&schema);
        let h = headers(&["email", "phone", "company"]);
        seen.observe(&h, &headers(&["a@x.io", "1", "Acme"])).unwrap();
        seen.observe(&h, &headers(&["b@x.io", "2", "Acme"])).unwrap();

        let err = seen.observe(&h, &headers(&["c@x.io", "1", "Initech"])).unwrap_err();
        assert!(matches!(err, IngestionError::DuplicatedValue { ref field, .. } if field == "phone"));
    }
}
