use anyhow::{Context, bail};
use serde_json::json;
use strata_config::StrataConfig;
use strata_schema::TypeRegistry;

use crate::bootstrap;
use crate::cli::{GlobalFlags, SchemaExportArgs, SchemaRegisterArgs};
use crate::commands::read_json;
use crate::output::output;

/// Handle `strata schema export`.
pub fn handle_export(args: &SchemaExportArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    let registry = TypeRegistry::new();
    match &args.type_name {
        None => output(&json!({ "types": registry.list() }), flags.format),
        Some(name) => {
            let Some(schema) = registry.get(name) else {
                bail!(
                    "unknown type '{name}'; known types: {}",
                    registry.list().join(", ")
                );
            };
            output(schema, flags.format)
        }
    }
}

/// Handle `strata schema register`.
pub async fn handle_register(
    args: &SchemaRegisterArgs,
    config: &StrataConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let document = read_json(&args.file)?;
    let svc = bootstrap::open_service(config, bootstrap::collaborators(config)?).await?;
    let definition = svc
        .register_schema(&args.kind, document)
        .await
        .with_context(|| format!("failed to register schema for kind '{}'", args.kind))?;
    tracing::info!(schema = %definition.name, version = definition.version, "schema registered");
    output(&definition, flags.format)
}
