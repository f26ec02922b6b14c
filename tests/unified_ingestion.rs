use std::sync::{Arc, Mutex};

use lead_stream::ingestion::{IngestRequest, IngestionOptions, IngestionService};
use lead_stream::repository::{
    InMemoryLeadRepository, InMemorySchemaRepository, LeadRepository, SchemaRepository,
};
use lead_stream::schema::{Schema, SchemaField, SchemaPolicy, SchemaService};
use lead_stream::types::{Record, SchemaId, Value};
use lead_stream::{ErrorCategory, IngestionError, IngestionResult};

struct Fixture {
    schemas: Arc<InMemorySchemaRepository>,
    leads: Arc<InMemoryLeadRepository>,
    schema_id: String,
}

impl Fixture {
    fn service(&self) -> IngestionService {
        IngestionService::new(self.schemas.clone(), self.leads.clone())
    }

    fn ingest(&self, csv: &str) -> IngestionResult<usize> {
        self.service()
            .process_and_save(&IngestRequest::from_bytes(self.schema_id.clone(), csv))
            .map(|stats| stats.rows)
    }
}

fn lead_schema() -> Schema {
    Schema::new(vec![
        SchemaField::new("email", "string").required().unique(),
        SchemaField::new("phone", "integer").required().unique(),
        SchemaField::new("name", "integer"),
    ])
}

fn fixture_with(schema: Schema) -> Fixture {
    let schemas = Arc::new(InMemorySchemaRepository::new());
    let leads = Arc::new(InMemoryLeadRepository::new());
    let saved = SchemaService::new(schemas.clone())
        .validate_and_save(schema)
        .unwrap();
    Fixture {
        schemas,
        leads,
        schema_id: saved.id.unwrap().to_string(),
    }
}

fn fixture() -> Fixture {
    fixture_with(lead_schema())
}

#[test]
fn valid_file_persists_every_row_in_one_batch() {
    let fx = fixture();
    let req = IngestRequest::from_path(fx.schema_id.clone(), "tests/fixtures/leads_valid.csv");
    let stats = fx.service().process_and_save(&req).unwrap();

    assert_eq!(stats.rows, 3);
    assert_eq!(fx.leads.batch_sizes(), vec![3]);

    let expected_id = SchemaId::parse(&fx.schema_id).unwrap();
    for rec in fx.leads.records() {
        assert_eq!(rec.schema_id(), Some(expected_id));
        assert!(rec.created_at().is_some());
        assert_eq!(rec.created_at(), rec.updated_at());
    }

    let first = &fx.leads.records()[0];
    assert_eq!(first.get("email"), Some(&Value::String("ada@example.com".to_string())));
    assert_eq!(first.get("phone"), Some(&Value::Integer(5550101)));
    assert_eq!(first.get("name"), Some(&Value::Integer(1)));
}

#[test]
fn comment_lines_do_not_count_as_rows() {
    let fx = fixture();
    let rows = fx
        .ingest("# header follows\nemail,phone\n#a@x.io,1\na@x.io,1\n# trailing\n")
        .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(fx.leads.len(), 1);
}

#[test]
fn repeated_unique_value_rejects_the_whole_file() {
    let fx = fixture();
    let req = IngestRequest::from_path(fx.schema_id.clone(), "tests/fixtures/leads_duplicate_email.csv");
    let err = fx.service().process_and_save(&req).unwrap_err();

    assert!(matches!(err, IngestionError::DuplicatedValue { ref field, .. } if field == "email"));
    assert!(fx.leads.is_empty());
    assert!(fx.leads.batch_sizes().is_empty());
}

#[test]
fn non_unique_columns_may_repeat() {
    let fx = fixture();
    let rows = fx
        .ingest("email,phone,name\na@x.io,1,7\nb@x.io,2,7\n")
        .unwrap();
    assert_eq!(rows, 2);
}

#[test]
fn header_missing_identity_field_is_rejected() {
    let fx = fixture();
    let req = IngestRequest::from_path(fx.schema_id.clone(), "tests/fixtures/leads_missing_phone.csv");
    let err = fx.service().process_and_save(&req).unwrap_err();
    assert!(matches!(err, IngestionError::RequiredFieldsMissing { .. }));
    assert!(fx.leads.is_empty());
}

#[test]
fn header_missing_schema_required_field_is_rejected() {
    let mut schema = lead_schema();
    schema.fields.push(SchemaField::new("company", "string").required());
    let fx = fixture_with(schema);

    let err = fx.ingest("email,phone\na@x.io,1\n").unwrap_err();
    assert!(
        matches!(err, IngestionError::RequiredFieldsMissing { ref missing } if missing == &["company"])
    );
}

#[test]
fn header_case_is_not_normalized() {
    let fx = fixture();
    let err = fx.ingest("EMAIL,phone\na@x.io,1\n").unwrap_err();
    assert!(matches!(err, IngestionError::RequiredFieldsMissing { .. }));
}

#[test]
fn schema_field_names_are_lower_cased_but_headers_are_not() {
    let fx = fixture_with(Schema::new(vec![
        SchemaField::new("Email", "String").required(),
        SchemaField::new("Phone", "Integer").required(),
    ]));
    // The stored schema uses lower-case names, so an upload must use them too.
    assert_eq!(fx.ingest("email,phone\na@x.io,1\n").unwrap(), 1);
    assert!(fx.ingest("Email,Phone\nb@x.io,2\n").is_err());
}

#[test]
fn repeated_header_column_is_rejected() {
    let fx = fixture();
    let req = IngestRequest::from_path(fx.schema_id.clone(), "tests/fixtures/leads_repeated_header.csv");
    let err = fx.service().process_and_save(&req).unwrap_err();
    assert!(matches!(err, IngestionError::DuplicatedFields { ref field } if field == "phone"));
}

#[test]
fn uncoercible_cell_rejects_the_whole_file() {
    let fx = fixture();
    let req = IngestRequest::from_path(fx.schema_id.clone(), "tests/fixtures/leads_bad_phone.csv");
    let err = fx.service().process_and_save(&req).unwrap_err();

    assert!(matches!(err, IngestionError::InvalidFieldValues { .. }));
    let msg = err.to_string();
    assert!(msg.contains("column 'phone'"), "{msg}");
    assert!(msg.contains("call-me"), "{msg}");
    assert!(fx.leads.is_empty());
}

#[test]
fn column_outside_the_schema_is_an_invalid_value() {
    let fx = fixture();
    let err = fx.ingest("email,phone,nickname\na@x.io,1,ace\n").unwrap_err();
    assert!(matches!(err, IngestionError::InvalidFieldValues { .. }));
}

#[test]
fn empty_cell_in_typed_column_is_an_invalid_value() {
    let fx = fixture();
    let err = fx.ingest("email,phone,name\na@x.io,1,\n").unwrap_err();
    assert!(matches!(err, IngestionError::InvalidFieldValues { .. }));
}

#[test]
fn short_rows_are_tolerated_by_default() {
    let fx = fixture();
    let rows = fx.ingest("email,phone,name\na@x.io,1\n").unwrap();
    assert_eq!(rows, 1);

    let rec = &fx.leads.records()[0];
    assert!(rec.get("name").is_none());
    assert_eq!(rec.get("phone"), Some(&Value::Integer(1)));
}

#[test]
fn short_rows_are_rejected_in_strict_mode() {
    let fx = fixture();
    let service = IngestionService::with_options(
        fx.schemas.clone(),
        fx.leads.clone(),
        IngestionOptions {
            strict_column_count: true,
            ..Default::default()
        },
    );
    let err = service
        .process_and_save(&IngestRequest::from_bytes(fx.schema_id.clone(), "email,phone,name\na@x.io,1\n"))
        .unwrap_err();
    assert!(matches!(err, IngestionError::InvalidFieldValues { .. }));
    assert!(fx.leads.is_empty());
}

#[test]
fn long_rows_are_rejected() {
    let fx = fixture();
    let err = fx.ingest("email,phone\na@x.io,1,extra\n").unwrap_err();
    assert!(matches!(err, IngestionError::InvalidFieldValues { .. }));
    assert!(err.to_string().contains("3 columns, header has 2"));
}

#[test]
fn empty_upload_lacks_required_fields() {
    let fx = fixture();
    let err = fx.ingest("").unwrap_err();
    assert!(matches!(err, IngestionError::RequiredFieldsMissing { .. }));
}

#[test]
fn header_only_upload_persists_an_empty_batch() {
    let fx = fixture();
    assert_eq!(fx.ingest("email,phone\n").unwrap(), 0);
    assert_eq!(fx.leads.batch_sizes(), vec![0]);
}

#[test]
fn unknown_schema_is_not_found() {
    let fx = fixture();
    let err = fx
        .service()
        .process_and_save(&IngestRequest::from_bytes(SchemaId::new().to_string(), "email,phone\n"))
        .unwrap_err();
    assert!(matches!(err, IngestionError::NotFound { .. }));
}

#[test]
fn malformed_schema_id_is_reported_as_such() {
    let fx = fixture();
    let err = fx
        .service()
        .process_and_save(&IngestRequest::from_bytes("123", "email,phone\n"))
        .unwrap_err();
    assert!(matches!(err, IngestionError::MalformedId { .. }));
}

#[test]
fn missing_upload_file_is_an_io_error() {
    let fx = fixture();
    let req = IngestRequest::from_path(fx.schema_id.clone(), "tests/fixtures/does_not_exist.csv");
    let err = fx.service().process_and_save(&req).unwrap_err();
    assert!(matches!(err, IngestionError::Io(_)));
}

#[test]
fn uniqueness_is_only_checked_within_the_file() {
    let fx = fixture();
    assert_eq!(fx.ingest("email,phone\na@x.io,1\n").unwrap(), 1);

    // Same phone, new email: passes the in-file check, then collides with nothing in the store
    // because the store indexes `email` and `telephone` only.
    assert_eq!(fx.ingest("email,phone\nb@x.io,1\n").unwrap(), 1);

    // Same email as an earlier upload: the store's unique index rejects the batch.
    let err = fx.ingest("email,phone\nc@x.io,3\na@x.io,4\n").unwrap_err();
    assert!(matches!(err, IngestionError::Conflict { .. }));
    assert_eq!(fx.leads.len(), 2);
}

struct FailingLeads {
    calls: Mutex<usize>,
}

impl LeadRepository for FailingLeads {
    fn create_many(&self, _records: Vec<Record>) -> IngestionResult<()> {
        *self.calls.lock().unwrap() += 1;
        Err(IngestionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "store went away",
        )))
    }
}

#[test]
fn persistence_failures_are_surfaced_unchanged() {
    let schemas = Arc::new(InMemorySchemaRepository::new());
    let mut schema = lead_schema();
    schemas.create(&mut schema).unwrap();
    let leads = Arc::new(FailingLeads { calls: Mutex::new(0) });

    let service = IngestionService::new(schemas, leads.clone());
    let err = service
        .process_and_save(&IngestRequest::from_bytes(
            schema.id.unwrap().to_string(),
            "email,phone\na@x.io,1\n",
        ))
        .unwrap_err();

    assert!(matches!(err, IngestionError::Io(ref e) if e.kind() == std::io::ErrorKind::ConnectionReset));
    assert_eq!(*leads.calls.lock().unwrap(), 1);
}

#[test]
fn unterminated_quote_rejects_the_upload() {
    let fx = fixture_with(Schema::new(vec![
        SchemaField::new("email", "string").required().unique(),
        SchemaField::new("phone", "string").required().unique(),
    ]));
    let err = fx
        .ingest("email,phone\na@x.io,\"555\nb@x.io,556\nc@x.io,557\n")
        .unwrap_err();

    assert!(matches!(err, IngestionError::MalformedCsv { line: 2, .. }), "{err:?}");
    assert!(fx.leads.is_empty());
    assert!(fx.leads.batch_sizes().is_empty());
}

#[test]
fn comment_with_open_quote_keeps_later_rows() {
    let fx = fixture();
    let rows = fx.ingest("email,phone\n#todo: \"check\na@x.io,1\nb@x.io,2\n").unwrap();
    assert_eq!(rows, 2);
    assert_eq!(fx.leads.len(), 2);
}

#[test]
fn one_policy_governs_schema_creation_and_uploads() {
    let policy = Arc::new(SchemaPolicy::from_json_str(r#"{"required_fields": ["account"]}"#).unwrap());
    let schemas = Arc::new(InMemorySchemaRepository::new());
    let leads = Arc::new(InMemoryLeadRepository::without_indexes());

    let saved = SchemaService::with_policy(schemas.clone(), policy.clone())
        .validate_and_save(Schema::new(vec![SchemaField::new("account", "string").unique()]))
        .unwrap();
    let service = IngestionService::with_options(
        schemas,
        leads.clone(),
        IngestionOptions {
            policy,
            ..Default::default()
        },
    );

    let stats = service
        .process_and_save(&IngestRequest::from_bytes(
            saved.id.unwrap().to_string(),
            "account\nacme\nglobex\n",
        ))
        .unwrap();
    assert_eq!(stats.rows, 2);
    assert_eq!(leads.len(), 2);
}

/// Returns schemas as if they had never been assigned an id.
struct IdlessSchemas;

impl SchemaRepository for IdlessSchemas {
    fn create(&self, _schema: &mut Schema) -> IngestionResult<()> {
        Ok(())
    }

    fn find_by_id(&self, _id: &str) -> IngestionResult<Schema> {
        Ok(lead_schema())
    }
}

#[test]
fn stored_schema_without_id_is_a_server_fault() {
    let leads = Arc::new(InMemoryLeadRepository::new());
    let service = IngestionService::new(Arc::new(IdlessSchemas), leads.clone());
    let err = service
        .process_and_save(&IngestRequest::from_bytes(SchemaId::new().to_string(), "email,phone\na@x.io,1\n"))
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::ServerFault);
    assert!(leads.is_empty());
}
