use clap::Parser;

pub mod global;
pub mod root_commands;

pub use global::{GlobalFlags, OutputFormat};
pub use root_commands::{
    Commands, ConsolidateArgs, ResolveArgs, SchemaCommands, SchemaExportArgs, SchemaRegisterArgs,
    ValidateArgs,
};

/// Top-level CLI parser for the `strata` binary.
#[derive(Debug, Parser)]
#[command(name = "strata", version, about = "Strata - hierarchical agent memory")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Database path (overrides database.path)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Extra dotenv file loaded before configuration
    #[arg(long, global = true)]
    pub env_file: Option<String>,
}

impl Cli {
    /// Extract ergonomic global flags struct for command handlers.
    #[must_use]
    pub fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            quiet: self.quiet,
            verbose: self.verbose,
            db: self.db.clone(),
            env_file: self.env_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use pretty_assertions::assert_eq;

    use super::{Cli, Commands, OutputFormat, SchemaCommands};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_before_subcommand() {
        let cli = Cli::try_parse_from(["strata", "--format", "raw", "--db", ":memory:", "stats"])
            .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Raw);
        let flags = cli.global_flags();
        assert_eq!(flags.db.as_deref(), Some(":memory:"));
        assert!(matches!(cli.command, Commands::Stats));
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["strata", "stats", "--quiet"]).expect("cli should parse");
        assert!(cli.quiet);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn resolve_collects_repeated_modules() {
        let cli = Cli::try_parse_from([
            "strata", "resolve", "--client", "vervelyn", "--synth", "s-1", "--class", "24",
            "--module", "seo", "--module", "ads", "--name", "blog_writing_sop_v4",
        ])
        .expect("cli should parse");

        let Commands::Resolve(args) = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(args.client, "vervelyn");
        assert_eq!(args.synth.as_deref(), Some("s-1"));
        assert_eq!(args.synth_class.as_deref(), Some("24"));
        assert_eq!(args.modules, vec!["seo".to_string(), "ads".to_string()]);
        assert_eq!(args.name.as_deref(), Some("blog_writing_sop_v4"));
    }

    #[test]
    fn class_requires_a_synth() {
        let result = Cli::try_parse_from(["strata", "resolve", "--client", "c", "--class", "24"]);
        assert!(result.is_err());
    }

    #[test]
    fn consolidate_once_and_entity_conflict() {
        let result =
            Cli::try_parse_from(["strata", "consolidate", "--once", "--entity", "ent-1"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from(["strata", "consolidate", "--entity", "ent-1"])
            .expect("cli should parse");
        let Commands::Consolidate(args) = cli.command else {
            panic!("expected consolidate");
        };
        assert_eq!(args.entity.as_deref(), Some("ent-1"));
        assert!(!args.once);
    }

    #[test]
    fn schema_export_type_is_optional() {
        let cli = Cli::try_parse_from(["strata", "schema", "export"]).expect("cli should parse");
        assert!(matches!(
            cli.command,
            Commands::Schema {
                action: SchemaCommands::Export(ref args)
            } if args.type_name.is_none()
        ));
    }
}
