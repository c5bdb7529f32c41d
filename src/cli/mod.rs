//! CLI entry point for stride.

pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

/// Plan-and-act agent CLI
#[derive(Parser, Debug)]
#[command(name = "stride", version, about = "stride - plan-and-act agent runner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent on a goal
    Run(RunArgs),
    /// Configuration management
    Config(ConfigArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Config file (defaults to CONFIG_PATH or ./config.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Keep task queues in memory instead of Redis
    #[arg(long)]
    pub memory_queue: bool,

    /// What the agent should do
    #[arg(required = true)]
    pub goal: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate a config file
    Check {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Install the global subscriber. `RUST_LOG` wins over `LOG_LEVEL`.
pub fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(settings.log_level.to_lowercase()))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub(crate) fn config_path(explicit: Option<PathBuf>, settings: &Settings) -> PathBuf {
    explicit.unwrap_or_else(|| PathBuf::from(&settings.config_path))
}
