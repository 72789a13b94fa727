//! fitchat - sync fitness activities and chat about them
//!
#![doc = "fitchat - sync fitness activities and chat about them"]
#![doc = "Main entry point for the fitchat application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fitchat::cli::{Cli, Commands};
use fitchat::commands;
use fitchat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Sync { .. } => {
            tracing::info!("Starting sync");
            commands::sync::run_sync(config).await
        }
        Commands::Chat { .. } => {
            tracing::info!("Starting interactive chat mode");
            commands::chat::run_chat(config).await
        }
        Commands::Login => commands::auth::login(config).await,
        Commands::Logout => commands::auth::logout(config),
        Commands::Status => commands::status::show_status(&config),
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins when set; otherwise `fitchat=info`, or `fitchat=debug`
/// with `--verbose`.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "fitchat=debug" } else { "fitchat=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
