//! Command-line interface definition for fitchat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for syncing, chatting, and managing the session.

use clap::{Parser, Subcommand};

/// fitchat - sync your activities and chat about them
///
/// Pulls activity history from the remote service into a local store,
/// then answers questions about it with an LLM.
#[derive(Parser, Debug, Clone)]
#[command(name = "fitchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for fitchat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Synchronize recent activities into the local store
    Sync {
        /// Lookback window in days (default from config: 180)
        #[arg(short, long)]
        days: Option<u32>,

        /// Only sync activities whose type contains this text
        #[arg(short = 't', long = "type", conflicts_with = "all_types")]
        r#type: Option<String>,

        /// Sync every activity type
        #[arg(long)]
        all_types: bool,
    },

    /// Start an interactive chat about the stored activities
    Chat {
        /// Override the provider from config (ollama, gemini)
        #[arg(short, long)]
        provider: Option<String>,

        /// Grounding context budget in characters
        #[arg(short, long)]
        budget: Option<usize>,
    },

    /// Log in to the activity service and save the session
    Login,

    /// Forget the saved session
    Logout,

    /// Show session and local store status
    Status,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_sync_defaults() {
        let cli = Cli::try_parse_from(["fitchat", "sync"]).unwrap();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        match cli.command {
            Commands::Sync {
                days,
                r#type,
                all_types,
            } => {
                assert!(days.is_none());
                assert!(r#type.is_none());
                assert!(!all_types);
            }
            other => panic!("Expected Sync command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_sync_with_options() {
        let cli =
            Cli::try_parse_from(["fitchat", "sync", "--days", "30", "--type", "cycling"]).unwrap();
        if let Commands::Sync { days, r#type, .. } = cli.command {
            assert_eq!(days, Some(30));
            assert_eq!(r#type.as_deref(), Some("cycling"));
        } else {
            panic!("Expected Sync command");
        }
    }

    #[test]
    fn test_cli_type_conflicts_with_all_types() {
        let result = Cli::try_parse_from(["fitchat", "sync", "--type", "running", "--all-types"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_chat_with_provider_and_budget() {
        let cli = Cli::try_parse_from(["fitchat", "chat", "-p", "ollama", "--budget", "4000"])
            .unwrap();
        if let Commands::Chat { provider, budget } = cli.command {
            assert_eq!(provider.as_deref(), Some("ollama"));
            assert_eq!(budget, Some(4000));
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_cli_parse_simple_commands() {
        for (arg, check) in [
            ("login", (|c: &Commands| matches!(c, Commands::Login)) as fn(&Commands) -> bool),
            ("logout", |c| matches!(c, Commands::Logout)),
            ("status", |c| matches!(c, Commands::Status)),
        ] {
            let cli = Cli::try_parse_from(["fitchat", arg]).unwrap();
            assert!(check(&cli.command), "{}", arg);
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli =
            Cli::try_parse_from(["fitchat", "-v", "--config", "/tmp/f.yaml", "status"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("/tmp/f.yaml"));
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["fitchat"]).is_err());
    }
}
