//! Configuration loading and service wiring shared by every command.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use strata_config::StrataConfig;
use strata_db::{Collaborators, MemoryService};
use strata_directory::{HttpActorDirectory, StaticDirectory};
use strata_embeddings::{EmbeddingProvider, HttpEmbedder};

use crate::cli::GlobalFlags;

/// Load configuration, honouring `--env-file` and `--db`.
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<StrataConfig> {
    if let Some(env_file) = &flags.env_file {
        dotenvy::from_path(Path::new(env_file))
            .with_context(|| format!("failed to load dotenv file at {env_file}"))?;
    }

    let mut config = StrataConfig::load_with_dotenv().context("failed to load configuration")?;
    if let Some(db) = &flags.db {
        config.database.path.clone_from(db);
    }
    Ok(config)
}

/// Collaborators from configuration.
///
/// Without a configured directory service every actor lookup is rejected.
pub fn collaborators(config: &StrataConfig) -> anyhow::Result<Collaborators> {
    let mut collaborators = if config.directory.is_configured() {
        let directory = HttpActorDirectory::new(
            config.directory.base_url.clone(),
            Some(config.directory.api_key.clone()),
            config.directory.timeout(),
        )
        .context("failed to build actor directory client")?;
        Collaborators::from_directory(Arc::new(directory))
    } else {
        tracing::warn!("directory.base_url is not set; every actor lookup will fail");
        Collaborators::from_directory(Arc::new(StaticDirectory::new()))
    };

    if let Some(provider) = embedding_provider(config)? {
        collaborators = collaborators.with_embeddings(provider);
    }
    Ok(collaborators)
}

fn embedding_provider(
    config: &StrataConfig,
) -> anyhow::Result<Option<Arc<dyn EmbeddingProvider>>> {
    let embeddings = &config.embeddings;
    if !embeddings.enabled || !embeddings.is_configured() {
        return Ok(None);
    }
    match embeddings.provider.as_str() {
        "local" => local_provider(),
        _ => {
            let provider = HttpEmbedder::new(
                &embeddings.api_url,
                embeddings.model.clone(),
                embeddings.dimension,
                embeddings.timeout(),
            )
            .context("failed to build embeddings client")?;
            Ok(Some(Arc::new(provider)))
        }
    }
}

#[cfg(feature = "local-embeddings")]
fn local_provider() -> anyhow::Result<Option<Arc<dyn EmbeddingProvider>>> {
    let provider = strata_embeddings::LocalEmbedder::new()
        .context("failed to load local embedding model")?;
    Ok(Some(Arc::new(provider)))
}

#[cfg(not(feature = "local-embeddings"))]
#[allow(clippy::unnecessary_wraps)]
fn local_provider() -> anyhow::Result<Option<Arc<dyn EmbeddingProvider>>> {
    tracing::warn!("embeddings.provider = 'local' needs the local-embeddings feature; storing no embeddings");
    Ok(None)
}

/// Open the configured store with the given collaborators.
pub async fn open_service(
    config: &StrataConfig,
    collaborators: Collaborators,
) -> anyhow::Result<MemoryService> {
    if !config.database.is_in_memory() {
        if let Some(parent) = Path::new(&config.database.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }
    }

    MemoryService::new_local(&config.database.path, collaborators, config)
        .await
        .with_context(|| format!("failed to open database at {}", config.database.path))
}
