use thiserror::Error;

/// Convenience result type for schema and ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned by schema validation, record decoding and ingestion.
///
/// This is a single error enum shared by the schema service, the CSV decoder, the ingestion
/// orchestrator and the repository layer. Every variant is terminal for the current call.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// A schema field declares a type outside the allowed type set.
    #[error("invalid field types")]
    InvalidFieldTypes,

    /// Two schema fields share the same (lower-cased) name.
    #[error("fields not unique")]
    FieldsNotUnique,

    /// A value could not be coerced into its column's declared type, or a schema uses a
    /// reserved field name.
    #[error("invalid field values: {message}")]
    InvalidFieldValues { message: String },

    /// A column marked unique repeats a value within the uploaded file.
    #[error("duplicated value: field '{field}' repeats '{value}'")]
    DuplicatedValue { field: String, value: String },

    /// The uploaded file's header lacks fields required by the system or by the schema.
    #[error("required fields missing: {missing:?}")]
    RequiredFieldsMissing { missing: Vec<String> },

    /// A schema definition lacks the system-mandated identity fields.
    #[error("required fields not present")]
    RequiredFieldsNotPresent,

    /// The uploaded file's header names the same column twice.
    #[error("duplicated fields: '{field}'")]
    DuplicatedFields { field: String },

    /// No schema exists for the given identifier.
    #[error("schema not found: {id}")]
    NotFound { id: String },

    /// The given identifier is not a valid schema identifier.
    #[error("malformed identifier '{id}': {source}")]
    MalformedId {
        id: String,
        #[source]
        source: uuid::Error,
    },

    /// The record store rejected a write because it collides with its unique index.
    #[error("already exists: {message}")]
    Conflict { message: String },

    /// Underlying I/O error (e.g. upload file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The upload is not well-formed CSV, e.g. a quoted field is never closed.
    #[error("malformed csv at line {line}: {message}")]
    MalformedCsv { line: u64, message: String },

    /// Structural CSV read error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON request body or policy file could not be decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of an [`IngestionError`] for boundary layers.
///
/// A transport maps these onto its own responses (e.g. HTTP 400/404/409/500).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller sent something invalid.
    ClientFault,
    /// The referenced schema does not exist.
    NotFound,
    /// The write collides with data already stored.
    Conflict,
    /// Infrastructure failure.
    ServerFault,
}

impl IngestionError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            IngestionError::InvalidFieldTypes
            | IngestionError::FieldsNotUnique
            | IngestionError::InvalidFieldValues { .. }
            | IngestionError::DuplicatedValue { .. }
            | IngestionError::RequiredFieldsMissing { .. }
            | IngestionError::RequiredFieldsNotPresent
            | IngestionError::DuplicatedFields { .. }
            | IngestionError::MalformedId { .. }
            | IngestionError::MalformedCsv { .. }
            | IngestionError::Json(_) => ErrorCategory::ClientFault,
            IngestionError::NotFound { .. } => ErrorCategory::NotFound,
            IngestionError::Conflict { .. } => ErrorCategory::Conflict,
            IngestionError::Csv(err) => match err.kind() {
                csv::ErrorKind::Io(_) => ErrorCategory::ServerFault,
                _ => ErrorCategory::ClientFault,
            },
            IngestionError::Io(_) => ErrorCategory::ServerFault,
        }
    }

    pub(crate) fn invalid_value(message: impl Into<String>) -> Self {
        IngestionError::InvalidFieldValues {
            message: message.into(),
        }
    }
}
