use clap::{Args, Subcommand};

/// Top-level `strata` commands.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Merge statistical observations, once or on a schedule
    Consolidate(ConsolidateArgs),
    /// Validate a metadata document against an entity kind's schema
    Validate(ValidateArgs),
    /// Show the entities a caller sees after realm precedence
    Resolve(ResolveArgs),
    /// Print store-wide counts
    Stats,
    /// Export or register JSON Schemas
    Schema {
        #[command(subcommand)]
        action: SchemaCommands,
    },
}

#[derive(Clone, Debug, Args)]
pub struct ConsolidateArgs {
    /// Run a single batch pass and exit
    #[arg(long)]
    pub once: bool,

    /// Consolidate one entity and exit
    #[arg(long, conflicts_with = "once")]
    pub entity: Option<String>,

    /// Seconds between passes (defaults to consolidation.interval_secs)
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Args)]
pub struct ValidateArgs {
    /// Entity kind; the schema checked is `{kind}_metadata`
    #[arg(long)]
    pub kind: String,

    /// Path to a JSON file holding the metadata object
    #[arg(long)]
    pub metadata: String,

    /// Path to a JSON Schema file. Without it, the store's registered schema is used
    #[arg(long)]
    pub schema: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct ResolveArgs {
    /// Owning client id
    #[arg(long)]
    pub client: String,

    /// Resolve as this synth instead of as the client
    #[arg(long)]
    pub synth: Option<String>,

    /// Synth class the synth inherits from
    #[arg(long = "class", requires = "synth")]
    pub synth_class: Option<String>,

    /// Subscribed skill module (repeatable)
    #[arg(long = "module")]
    pub modules: Vec<String>,

    /// Only the winner for this logical name
    #[arg(long)]
    pub name: Option<String>,

    /// Only entities of this kind
    #[arg(long)]
    pub kind: Option<String>,

    /// Max entities to print
    #[arg(long)]
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum SchemaCommands {
    /// Print the JSON Schema of a Strata type, or list the known types
    Export(SchemaExportArgs),
    /// Store a metadata schema for an entity kind in the local database
    Register(SchemaRegisterArgs),
}

#[derive(Clone, Debug, Args)]
pub struct SchemaExportArgs {
    /// Type name, e.g. `entity` or `resolved_set`. Omit to list names
    pub type_name: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct SchemaRegisterArgs {
    /// Entity kind the schema gates
    #[arg(long)]
    pub kind: String,

    /// Path to the JSON Schema document
    #[arg(long)]
    pub file: String,
}
