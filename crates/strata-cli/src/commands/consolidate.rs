use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use strata_config::StrataConfig;
use strata_db::consolidation::ConsolidationScheduler;

use crate::bootstrap;
use crate::cli::{ConsolidateArgs, GlobalFlags};
use crate::output::output;

/// Handle `strata consolidate`.
///
/// `--entity` and `--once` print one outcome or one sweep. Otherwise the
/// scheduler runs until Ctrl-C and the accumulated totals are printed.
pub async fn handle(
    args: &ConsolidateArgs,
    config: &StrataConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let svc = bootstrap::open_service(config, bootstrap::collaborators(config)?).await?;

    if let Some(entity_id) = &args.entity {
        let outcome = svc.consolidate_entity(entity_id).await?;
        return output(&outcome, flags.format);
    }
    if args.once {
        let sweep = svc.consolidate_batch().await?;
        return output(&sweep, flags.format);
    }

    let interval = args
        .interval_secs
        .filter(|secs| *secs > 0)
        .map_or_else(|| config.consolidation.interval(), Duration::from_secs);
    let (handle, shutdown) = ConsolidationScheduler::new(Arc::new(svc), interval).spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("shutdown requested, finishing the current pass");
    // The receiver may already be gone if the task panicked; join reports that.
    let _ = shutdown.send(true);

    let totals = handle.await.context("consolidation scheduler task failed")?;
    output(&totals, flags.format)
}
