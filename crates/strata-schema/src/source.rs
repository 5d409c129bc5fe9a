//! Where schema documents come from.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use strata_core::entities::SchemaDefinition;

use crate::SchemaError;

/// Read-only access to the external schema registry.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Fetch the latest version of a schema. `Ok(None)` means it does not exist.
    async fn get_schema(&self, name: &str) -> Result<Option<SchemaDefinition>, SchemaError>;
}

/// In-memory schema source for tests and offline validation.
#[derive(Debug, Default)]
pub struct StaticSchemaSource {
    schemas: RwLock<HashMap<String, SchemaDefinition>>,
    pending_failures: AtomicU32,
    calls: AtomicU32,
}

impl StaticSchemaSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `document` as version 1 of `{entity_kind}_metadata`.
    #[must_use]
    pub fn with_kind(self, entity_kind: &str, document: serde_json::Value) -> Self {
        self.insert(SchemaDefinition {
            name: SchemaDefinition::name_for_kind(entity_kind),
            document,
            version: 1,
        });
        self
    }

    /// Add or replace a schema.
    pub fn insert(&self, definition: SchemaDefinition) {
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(definition.name.clone(), definition);
    }

    /// Make the next `n` lookups fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Lookups received so far, failed ones included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaSource for StaticSchemaSource {
    async fn get_schema(&self, name: &str) -> Result<Option<SchemaDefinition>, SchemaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SchemaError::Unavailable("injected failure".into()));
        }
        Ok(self
            .schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned())
    }
}
