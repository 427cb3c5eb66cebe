//! Logging setup: terminal output plus optional daily-rotated log files.
//!
//! `RUST_LOG` overrides the default level (`info`, or `debug` with `--verbose`),
//! e.g. `RUST_LOG=medicament_sync=debug,reqwest=warn`.
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const TEXT_LOG_FILE: &str = "medicament_sync.log";
const JSON_LOG_FILE: &str = "medicament_sync.json.log";

fn env_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber.
///
/// With a `log_dir`, two extra files are written there and rotated daily:
/// a plain-text log and a JSON log for machine consumption. The returned
/// guards flush those writers and must be held until the process exits.
pub fn init_logging(
    verbose: bool,
    log_dir: Option<&Path>,
) -> Result<Vec<WorkerGuard>, Box<dyn std::error::Error>> {
    let mut guards = Vec::new();

    let stdout_layer = fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(env_filter(verbose));

    let (text_layer, json_layer) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;

            let (text_writer, text_guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, TEXT_LOG_FILE));
            let (json_writer, json_guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, JSON_LOG_FILE));
            guards.push(text_guard);
            guards.push(json_guard);

            let text_layer = fmt::layer()
                .with_writer(text_writer)
                .with_target(true)
                .with_line_number(true)
                .with_ansi(false)
                .compact()
                .with_filter(env_filter(verbose));

            let json_layer = fmt::layer()
                .json()
                .with_writer(json_writer)
                .with_target(true)
                .with_line_number(true)
                .with_current_span(true)
                .with_filter(env_filter(verbose));

            (Some(text_layer), Some(json_layer))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(text_layer)
        .with(json_layer)
        .try_init()?;

    if let Some(dir) = log_dir {
        tracing::debug!("Writing logs to {}", dir.display());
    }

    Ok(guards)
}
