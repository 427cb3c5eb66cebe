//! High-level orchestration for the CLI subcommands.

pub mod config;
pub mod maintenance;
pub mod update;

pub use config::build_update_config;
pub use maintenance::{run_normalize_classes_command, NormalizeReport};
pub use update::{run_update, run_update_command, RunReport, UpdateError};
