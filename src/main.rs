//! stride CLI binary entry point.

use clap::Parser;
use stride::cli::{run, Cli, Commands, ConfigCommands};
use stride::config::Settings;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = Settings::from_env();
    stride::cli::init_tracing(&settings);

    let result = match cli.command {
        Commands::Run(args) => run::handle_run(args, &settings).await,
        Commands::Config(config_args) => match config_args.command {
            ConfigCommands::Check { config } => run::handle_config_check(config, &settings),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        if let Some(hint) = e.recovery_suggestion().hint() {
            eprintln!("Hint: {hint}");
        }
        std::process::exit(1);
    }
}
