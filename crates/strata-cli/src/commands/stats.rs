use strata_config::StrataConfig;

use crate::bootstrap;
use crate::cli::GlobalFlags;
use crate::output::output;

/// Handle `strata stats`.
pub async fn handle(config: &StrataConfig, flags: &GlobalFlags) -> anyhow::Result<()> {
    let svc = bootstrap::open_service(config, bootstrap::collaborators(config)?).await?;
    let stats = svc.stats().await?;
    output(&stats, flags.format)
}
