use medicament_sync::cli::{Cli, Commands};
use medicament_sync::logging::init_logging;
use medicament_sync::orchestration::{run_normalize_classes_command, run_update_command, UpdateError};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Guards flush the file writers on drop, so they live until main returns.
    let _log_guards = match init_logging(cli.verbose, cli.log_dir.as_deref()) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(3);
        }
    };

    let result: Result<(), UpdateError> = match cli.command {
        Commands::Update(args) => run_update_command(&args).await.map(|report| {
            println!(
                "Discovered {} from {} sitemaps, fetched {} | {}{}",
                report.discovered,
                report.sitemap_count,
                report.fetched,
                report.stats,
                if report.written { "" } else { " (dry-run)" }
            );
        }),

        Commands::NormalizeClasses { data_dir, dry_run } => {
            run_normalize_classes_command(&data_dir, dry_run).map(|report| println!("{}", report))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
