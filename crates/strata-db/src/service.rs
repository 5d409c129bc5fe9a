//! Service layer: the database plus every collaborator a write or read needs.
//!
//! `MemoryService` wraps `StrataDb` (raw database access), the actor and
//! membership caches, the schema validator, and the resilient embedder. All
//! repo, resolver, and consolidation methods are implemented as
//! `impl MemoryService` in their own modules.

use std::sync::Arc;

use strata_config::StrataConfig;
use strata_core::retry::RetryConfig;
use strata_directory::{ActorDirectory, ActorResolver, MembershipCache, MembershipDirectory};
use strata_embeddings::{EmbeddingProvider, ResilientEmbedder};
use strata_schema::{SchemaCache, SchemaSource, SchemaValidator};
use crate::{StrataDb, Writer};
use crate::consolidation::{ClassificationTable, ConsolidationPolicy};
use crate::error::{DatabaseError, MemoryError};
use crate::schema_source::DbSchemaSource;

/// External services the memory service consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub actors: Arc<dyn ActorDirectory>,
    pub membership: Arc<dyn MembershipDirectory>,
    /// `None` reads schemas from the store's own `schema_definitions` table.
    pub schemas: Option<Arc<dyn SchemaSource>>,
    /// `None` stores no embeddings.
    pub embeddings: Option<Arc<dyn EmbeddingProvider>>,
}

impl Collaborators {
    /// Use one object as both actor and membership directory.
    #[must_use]
    pub fn from_directory<D>(directory: Arc<D>) -> Self
    where
        D: ActorDirectory + MembershipDirectory + 'static,
    {
        Self {
            actors: directory.clone(),
            membership: directory,
            schemas: None,
            embeddings: None,
        }
    }

    #[must_use]
    pub fn with_schemas(mut self, schemas: Arc<dyn SchemaSource>) -> Self {
        self.schemas = Some(schemas);
        self
    }

    #[must_use]
    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }
}

/// Tunables for resolution and consolidation.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub consolidation: ConsolidationPolicy,
    pub classification: ClassificationTable,
    pub default_max_depth: u32,
    pub node_budget: u32,
    /// Partial paths one `find_connections` call may expand.
    pub path_budget: u32,
    /// Applied to collaborator calls and optimistic-write conflicts.
    pub retry: RetryConfig,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&StrataConfig::default())
    }
}

impl ServiceSettings {
    #[must_use]
    pub fn from_config(config: &StrataConfig) -> Self {
        Self {
            consolidation: ConsolidationPolicy::from_config(&config.consolidation),
            classification: ClassificationTable::default(),
            default_max_depth: config.resolver.default_max_depth,
            node_budget: config.resolver.node_budget,
            path_budget: config.resolver.path_budget,
            retry: config.retry.to_retry_config(),
        }
    }
}

/// The memory engine's service surface.
pub struct MemoryService {
    db: StrataDb,
    actors: ActorResolver,
    membership: MembershipCache,
    validator: SchemaValidator,
    embedder: ResilientEmbedder,
    settings: ServiceSettings,
}

impl MemoryService {
    /// Open a local database and wire collaborators from configuration.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the libSQL database file, or `":memory:"` for tests.
    /// * `collaborators` - Directory, schema source, and embedding provider.
    /// * `config` - Cache lifetimes, timeouts, retry policy, and thresholds.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new_local(
        db_path: &str,
        collaborators: Collaborators,
        config: &StrataConfig,
    ) -> Result<Self, DatabaseError> {
        let db = StrataDb::open_local(db_path).await?;
        let retry = config.retry.to_retry_config();

        let actors = ActorResolver::new(collaborators.actors, config.directory.actor_ttl())
            .with_retry(retry.clone())
            .with_timeout(config.directory.timeout());
        let membership =
            MembershipCache::new(collaborators.membership, config.resolver.membership_ttl())
                .with_retry(retry.clone())
                .with_timeout(config.directory.timeout());

        let source: Arc<dyn SchemaSource> = match collaborators.schemas {
            Some(source) => source,
            None => Arc::new(DbSchemaSource::new(db.handle())),
        };
        let validator =
            SchemaValidator::new(source, Arc::new(SchemaCache::new(config.schema.cache_ttl())))
                .with_retry(retry)
                .with_timeout(config.schema.timeout());

        let embedder = match collaborators.embeddings {
            Some(provider) if config.embeddings.enabled => {
                ResilientEmbedder::new(provider, config.embeddings.timeout())
            }
            _ => ResilientEmbedder::disabled(config.embeddings.dimension),
        };

        Ok(Self::from_parts(
            db,
            actors,
            membership,
            validator,
            embedder,
            ServiceSettings::from_config(config),
        ))
    }

    /// Assemble a service from already built parts.
    #[must_use]
    pub fn from_parts(
        db: StrataDb,
        actors: ActorResolver,
        membership: MembershipCache,
        validator: SchemaValidator,
        embedder: ResilientEmbedder,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            db,
            actors,
            membership,
            validator,
            embedder,
            settings,
        }
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &StrataDb {
        &self.db
    }

    #[must_use]
    pub const fn actors(&self) -> &ActorResolver {
        &self.actors
    }

    #[must_use]
    pub const fn membership(&self) -> &MembershipCache {
        &self.membership
    }

    #[must_use]
    pub const fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    #[must_use]
    pub const fn embedder(&self) -> &ResilientEmbedder {
        &self.embedder
    }

    #[must_use]
    pub const fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Serialize writers and hold readers off. Hold only around a
    /// transaction, never across directory, schema, or embedding calls, and
    /// never call a reading method while holding it.
    pub(crate) async fn write_gate(&self) -> Writer<'_> {
        self.db.write().await
    }

    /// Begin a transaction on the shared connection. The caller holds the
    /// write gate.
    pub(crate) async fn begin(&self) -> Result<libsql::Transaction, MemoryError> {
        Ok(self.db.conn().transaction().await?)
    }
}

/// Commit on success, roll back on failure.
pub(crate) async fn finish<T>(
    tx: libsql::Transaction,
    result: Result<T, MemoryError>,
) -> Result<T, MemoryError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}
