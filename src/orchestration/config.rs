//! Turns parsed CLI arguments into the run configuration.

use crate::cli::UpdateArgs;
use crate::config::UpdateConfig;

/// Build the update configuration.
///
/// A positive `--limit` without `--dry-run` switches dry-run on, so a trial run
/// over a slice of the catalog can never publish a truncated dataset.
pub fn build_update_config(args: &UpdateArgs) -> UpdateConfig {
    let limit = (args.limit > 0).then_some(args.limit);
    let mut dry_run = args.dry_run;
    if limit.is_some() && !dry_run {
        tracing::warn!("--limit was provided without --dry-run; enabling dry-run so nothing is written");
        dry_run = true;
    }

    UpdateConfig {
        data_dir: args.data_dir.clone(),
        sitemap_index_url: args.sitemap_index.clone(),
        user_agent: args.user_agent.clone(),
        timeout_secs: args.timeout,
        request_delay_secs: args.request_delay,
        request_jitter_secs: args.request_jitter,
        concurrency: args.concurrency,
        full_refresh: args.full_refresh,
        force_accept_drop: args.force_accept_drop,
        dry_run,
        limit,
        ..UpdateConfig::default()
    }
}
