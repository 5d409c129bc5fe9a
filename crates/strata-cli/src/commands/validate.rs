use std::sync::Arc;

use anyhow::bail;
use strata_config::StrataConfig;
use strata_schema::{SchemaCache, SchemaValidator, StaticSchemaSource, ValidationReport};

use crate::bootstrap;
use crate::cli::{GlobalFlags, ValidateArgs};
use crate::commands::{read_json, read_json_object};
use crate::output::output;

/// Handle `strata validate --schema FILE`, which never touches the store.
pub async fn handle_offline(args: &ValidateArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    let Some(schema_path) = &args.schema else {
        bail!("offline validation needs --schema");
    };
    let source = StaticSchemaSource::new().with_kind(&args.kind, read_json(schema_path)?);
    let validator = SchemaValidator::new(
        Arc::new(source),
        Arc::new(SchemaCache::new(StrataConfig::default().schema.cache_ttl())),
    );

    let metadata = read_json_object(&args.metadata)?;
    let report = validator.validate(&args.kind, &metadata).await?;
    finish(&report, flags)
}

/// Handle `strata validate` against the schema registered in the store.
pub async fn handle(
    args: &ValidateArgs,
    config: &StrataConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    if args.schema.is_some() {
        return handle_offline(args, flags).await;
    }
    let svc = bootstrap::open_service(config, bootstrap::collaborators(config)?).await?;
    let metadata = read_json_object(&args.metadata)?;
    let report = svc.validator().validate(&args.kind, &metadata).await?;
    finish(&report, flags)
}

fn finish(report: &ValidationReport, flags: &GlobalFlags) -> anyhow::Result<()> {
    output(report, flags.format)?;
    if !report.passed {
        bail!(
            "metadata failed {} (v{}) with {} error(s)",
            report.schema,
            report.schema_version,
            report.errors.len()
        );
    }
    Ok(())
}
