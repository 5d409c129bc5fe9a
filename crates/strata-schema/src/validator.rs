//! The metadata schema gate.
//!
//! Metadata for an entity of kind `K` is validated against the schema named
//! `K_metadata`. A missing schema is an error, never a pass: validation is
//! not silently skipped.

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strata_core::entities::{Metadata, SchemaDefinition, VALIDATION_KEY, ValidationStamp};
use strata_core::retry::{RetryConfig, retry};

use crate::{CachedSchema, FieldError, SchemaCache, SchemaError, SchemaSource};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of validating one metadata object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationReport {
    pub passed: bool,
    pub errors: Vec<FieldError>,
    pub warnings: Vec<String>,
    pub schema: String,
    pub schema_version: i64,
}

pub struct SchemaValidator {
    source: Arc<dyn SchemaSource>,
    cache: Arc<SchemaCache>,
    retry: RetryConfig,
    timeout: Duration,
}

impl SchemaValidator {
    #[must_use]
    pub fn new(source: Arc<dyn SchemaSource>, cache: Arc<SchemaCache>) -> Self {
        Self {
            source,
            cache,
            retry: RetryConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The cache handle this validator reads through.
    #[must_use]
    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    /// Fetch (or reuse) the compiled schema for an entity kind.
    ///
    /// # Errors
    ///
    /// `SchemaError::NotFound` when the source has no such schema,
    /// `SchemaError::InvalidSchema` when it does not compile, and
    /// `SchemaError::ServiceUnavailable` when the source stays unreachable.
    pub async fn schema_for_kind(&self, entity_kind: &str) -> Result<CachedSchema, SchemaError> {
        let name = SchemaDefinition::name_for_kind(entity_kind);
        if let Some(hit) = self.cache.get(&name) {
            tracing::debug!(schema = %name, "schema cache hit");
            return Ok(hit);
        }
        tracing::debug!(schema = %name, "schema cache miss");

        let definition = retry(&self.retry, "schema_lookup", || async {
            match tokio::time::timeout(self.timeout, self.source.get_schema(&name)).await {
                Ok(result) => result,
                Err(_) => Err(SchemaError::Timeout(self.timeout)),
            }
        })
        .await?
        .ok_or_else(|| SchemaError::NotFound(name.clone()))?;

        let compiled = CachedSchema::compile(definition)?;
        self.cache.insert(compiled.clone());
        Ok(compiled)
    }

    /// Validate metadata for an entity kind and report the result.
    ///
    /// A failing report is `Ok`; only lookup problems are errors.
    ///
    /// # Errors
    ///
    /// See [`Self::schema_for_kind`].
    pub async fn validate(
        &self,
        entity_kind: &str,
        metadata: &Metadata,
    ) -> Result<ValidationReport, SchemaError> {
        let schema = self.schema_for_kind(entity_kind).await?;
        Ok(check_metadata(&schema, metadata))
    }

    /// Validate several metadata objects against one kind's schema.
    ///
    /// # Errors
    ///
    /// See [`Self::schema_for_kind`].
    pub async fn validate_batch(
        &self,
        entity_kind: &str,
        items: &[Metadata],
    ) -> Result<Vec<ValidationReport>, SchemaError> {
        let schema = self.schema_for_kind(entity_kind).await?;
        Ok(items.iter().map(|m| check_metadata(&schema, m)).collect())
    }

    /// Validate and, on success, return the metadata with a fresh stamp.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::ValidationFailed` with field-level errors when
    /// the metadata does not conform, plus any lookup error.
    pub async fn validate_and_stamp(
        &self,
        entity_kind: &str,
        metadata: &Metadata,
    ) -> Result<(Metadata, ValidationReport), SchemaError> {
        let schema = self.schema_for_kind(entity_kind).await?;
        stamp_metadata(&schema, metadata)
    }
}

/// Validate metadata against an already compiled schema.
///
/// Any existing stamp is ignored.
#[must_use]
pub fn check_metadata(schema: &CachedSchema, metadata: &Metadata) -> ValidationReport {
    let stripped = ValidationStamp::strip(metadata);
    let instance = serde_json::Value::Object(stripped);

    let errors: Vec<FieldError> = schema
        .validator
        .iter_errors(&instance)
        .map(|e| FieldError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    ValidationReport {
        passed: errors.is_empty(),
        errors,
        warnings: warnings(&schema.definition, metadata),
        schema: schema.definition.name.clone(),
        schema_version: schema.definition.version,
    }
}

/// Validate against a compiled schema and stamp on success.
///
/// # Errors
///
/// Returns `SchemaError::ValidationFailed` when the metadata does not conform.
pub fn stamp_metadata(
    schema: &CachedSchema,
    metadata: &Metadata,
) -> Result<(Metadata, ValidationReport), SchemaError> {
    let report = check_metadata(schema, metadata);
    if !report.passed {
        return Err(SchemaError::ValidationFailed {
            schema: report.schema,
            errors: report.errors,
        });
    }
    let mut stamped = ValidationStamp::strip(metadata);
    ValidationStamp::passed(&report.schema, report.schema_version).apply(&mut stamped);
    Ok((stamped, report))
}

fn warnings(definition: &SchemaDefinition, metadata: &Metadata) -> Vec<String> {
    let mut warnings = Vec::new();
    let declared = definition
        .document
        .get("properties")
        .and_then(serde_json::Value::as_object);
    let closed = definition.document.get("additionalProperties")
        == Some(&serde_json::Value::Bool(false));

    for key in metadata.keys() {
        if key == VALIDATION_KEY {
            continue;
        }
        if key.starts_with('_') {
            warnings.push(format!("key '{key}' uses the reserved '_' prefix"));
        } else if !closed && declared.is_some_and(|d| !d.contains_key(key)) {
            warnings.push(format!(
                "key '{key}' is not declared by schema '{}'",
                definition.name
            ));
        }
    }
    warnings
}
