//! Ordered schema validation.

use std::sync::Arc;

use crate::error::{IngestionError, IngestionResult};

use super::{Schema, SchemaPolicy};

/// Runs the schema checks in a fixed order and reports the first failure.
///
/// Order matters: uniqueness assumes names are already normalized and the reserved-name and
/// identity checks assume names are unique.
///
/// 1. field types → [`IngestionError::InvalidFieldTypes`]
/// 2. unique names → [`IngestionError::FieldsNotUnique`]
/// 3. reserved names → [`IngestionError::InvalidFieldValues`]
/// 4. identity fields → [`IngestionError::RequiredFieldsNotPresent`]
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    policy: Arc<SchemaPolicy>,
}

impl SchemaValidator {
    pub fn new(policy: impl Into<Arc<SchemaPolicy>>) -> Self {
        Self {
            policy: policy.into(),
        }
    }

    pub fn policy(&self) -> &SchemaPolicy {
        &self.policy
    }

    pub(crate) fn shared_policy(&self) -> &Arc<SchemaPolicy> {
        &self.policy
    }

    /// Validate an already-normalized schema.
    pub fn validate(&self, schema: &Schema) -> IngestionResult<()> {
        if !schema.has_valid_field_types(&self.policy) {
            return Err(IngestionError::InvalidFieldTypes);
        }
        if !schema.has_unique_field_names() {
            return Err(IngestionError::FieldsNotUnique);
        }
        if !schema.avoids_reserved_fields(&self.policy) {
            return Err(IngestionError::invalid_value(format!(
                "field names {:?} are reserved",
                self.policy.reserved_fields
            )));
        }
        if !schema.declares_required_fields(&self.policy) {
            return Err(IngestionError::RequiredFieldsNotPresent);
        }
        Ok(())
    }

    /// Normalize `schema` in place, then validate it.
    pub fn normalize_and_validate(&self, schema: &mut Schema) -> IngestionResult<()> {
        schema.normalize();
        self.validate(schema)
    }
}
