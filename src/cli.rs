use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Keeps the local medicament dataset in sync with medicament.ma.
/// Exit codes: 0=success, 2=invalid arguments, 3=config or I/O error,
/// 4=sitemap discovery failed, 5=drop guard tripped
#[derive(Parser, Debug)]
#[command(name = "medicament_sync")]
#[command(about = "Incremental sitemap-driven updater for the medicament dataset")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Verbose (debug) logs")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Also write daily-rotated text and JSON logs to this directory")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover pages from the sitemap, fetch what changed and publish the dataset.
    Update(UpdateArgs),

    /// Re-run therapeutic class cleanup over the existing dataset.
    NormalizeClasses {
        #[arg(
            short,
            long,
            env = "MEDICAMENT_DATA_DIR",
            default_value = "./public/data",
            help = "Directory holding the dataset"
        )]
        data_dir: PathBuf,

        #[arg(long, help = "Report what would change without writing")]
        dry_run: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    #[arg(
        short,
        long,
        env = "MEDICAMENT_DATA_DIR",
        default_value = "./public/data",
        help = "Directory holding the dataset and state files"
    )]
    pub data_dir: PathBuf,

    #[arg(long, help = "Ignore cache hints and re-fetch every discovered page")]
    pub full_refresh: bool,

    #[arg(long, help = "Publish even if the dataset shrinks by more than the drop guard allows")]
    pub force_accept_drop: bool,

    #[arg(
        long,
        default_value_t = 0,
        help = "Process only the first N discovered entries (implies --dry-run)"
    )]
    pub limit: usize,

    #[arg(long, help = "Run the whole update without writing any file")]
    pub dry_run: bool,

    #[arg(
        long,
        env = "MEDICAMENT_REQUEST_DELAY",
        default_value_t = Config::DEFAULT_REQUEST_DELAY_SECS,
        allow_negative_numbers = true,
        help = "Minimum seconds between page request starts"
    )]
    pub request_delay: f64,

    #[arg(
        long,
        env = "MEDICAMENT_REQUEST_JITTER",
        default_value_t = Config::DEFAULT_REQUEST_JITTER_SECS,
        allow_negative_numbers = true,
        help = "Random +/- seconds added to each request delay"
    )]
    pub request_jitter: f64,

    #[arg(
        long,
        env = "MEDICAMENT_CONCURRENCY",
        default_value_t = Config::DEFAULT_CONCURRENCY,
        help = "Number of parallel fetch workers"
    )]
    pub concurrency: usize,

    #[arg(long, default_value = Config::SITEMAP_INDEX_URL, help = "Sitemap index URL")]
    pub sitemap_index: String,

    #[arg(short, long, default_value = Config::USER_AGENT, help = "User agent string for requests")]
    pub user_agent: String,

    #[arg(
        short,
        long,
        default_value_t = Config::REQUEST_TIMEOUT_SECS,
        help = "Per-attempt request timeout in seconds"
    )]
    pub timeout: u64,
}

impl Cli {
    /// On error, clap prints help and exits with code 2 (usage error).
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
