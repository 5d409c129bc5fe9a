use strata_config::StrataConfig;

use crate::cli::{Commands, GlobalFlags, SchemaCommands};
use crate::commands;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(
    command: Commands,
    config: &StrataConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match command {
        Commands::Consolidate(args) => commands::consolidate::handle(&args, config, flags).await,
        Commands::Validate(args) => commands::validate::handle(&args, config, flags).await,
        Commands::Resolve(args) => commands::resolve::handle(&args, config, flags).await,
        Commands::Stats => commands::stats::handle(config, flags).await,
        Commands::Schema {
            action: SchemaCommands::Register(args),
        } => commands::schema::handle_register(&args, config, flags).await,
        Commands::Schema {
            action: SchemaCommands::Export(args),
        } => commands::schema::handle_export(&args, flags),
    }
}
