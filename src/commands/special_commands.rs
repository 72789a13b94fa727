//! Special commands parser for interactive chat
//!
//! Commands are prefixed with `/` and are case-insensitive. The bare words
//! `exit` and `quit` also end the session. Anything else is a question for
//! the model.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command takes no argument but one was given
    #[error("{command} takes no arguments (got '{arg}')")]
    UnexpectedArgument { command: String, arg: String },
}

/// Special commands available during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Show available commands
    Help,

    /// Show provider, session state and grounding figures
    ShowStatus,

    /// Rebuild the grounding context from the local store
    Reload,

    /// End the session
    Exit,

    /// Not a special command; send the input to the model
    None,
}

/// Parse user input into a special command
///
/// # Examples
///
/// ```
/// use fitchat::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/RELOAD").unwrap(), SpecialCommand::Reload);
/// assert_eq!(parse_special_command("quit").unwrap(), SpecialCommand::Exit);
/// assert_eq!(
///     parse_special_command("What was my longest run?").unwrap(),
///     SpecialCommand::None
/// );
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(SpecialCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (command, arg) = match lower.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (lower.as_str(), ""),
    };

    let parsed = match command {
        "/help" | "/?" => SpecialCommand::Help,
        "/status" => SpecialCommand::ShowStatus,
        "/reload" => SpecialCommand::Reload,
        "/exit" | "/quit" => SpecialCommand::Exit,
        _ => return Err(CommandError::UnknownCommand(trimmed.to_string())),
    };

    if !arg.is_empty() {
        return Err(CommandError::UnexpectedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        });
    }
    Ok(parsed)
}

/// Print the special commands help
pub fn print_help() {
    println!(
        r#"
Chat Commands
=============

  /help           - Show this help
  /status         - Show provider, session state and grounding details
  /reload         - Reload activities from the local store (after a sync)
  /exit, /quit    - End the session (also: exit, quit, Ctrl-D)

Anything else is sent to the model as a question about your activities.
"#
    );
}
