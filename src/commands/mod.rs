//! Command handlers for the fitchat CLI
//!
//! Each subcommand of [`crate::cli::Commands`] has a handler here. Handlers
//! wire configuration into the library types, talk to the user through
//! `rustyline` and `colored`, and return errors to `main` for reporting.

use std::sync::Arc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::auth::{AuthOutcome, CredentialStore, Credentials, MfaChallenge, Session, SessionManager};
use crate::config::Config;
use crate::error::{FitchatError, Result};
use crate::remote::{ActivityService, HttpActivityService, ThrottledService};

pub mod special_commands;

/// Most MFA codes accepted per interactive login
const MAX_MFA_ATTEMPTS: u32 = 3;

/// Remote service stack used by every command: HTTP adapter behind the
/// throttle/retry decorator.
fn build_service(config: &Config) -> Result<Arc<dyn ActivityService>> {
    let http = HttpActivityService::from_config(&config.remote)?;
    Ok(Arc::new(ThrottledService::new(
        Arc::new(http),
        config.sync.retry.policy(),
        config.sync.min_call_interval(),
    )))
}

fn credentials(config: &Config) -> Option<Credentials> {
    match (&config.remote.email, &config.remote.password) {
        (Some(email), Some(password)) => Some(Credentials::new(email, password)),
        _ => None,
    }
}

fn session_manager(config: &Config, service: Arc<dyn ActivityService>) -> Result<SessionManager> {
    let store = CredentialStore::new(config.storage.credentials_path()?);
    Ok(SessionManager::new(service, store, credentials(config)))
}

/// Authenticate, asking for MFA codes through `read_code` when needed.
///
/// `read_code` returns `None` when the user gives up. A rejected code is
/// reported and asked for again, up to three attempts.
///
/// # Errors
///
/// - `MfaRequired` if the user gives up or every attempt is rejected
/// - anything [`SessionManager::authenticate`] returns
pub async fn authenticate_interactive<F>(
    sessions: &mut SessionManager,
    mut read_code: F,
) -> Result<Session>
where
    F: FnMut(&MfaChallenge) -> Result<Option<String>>,
{
    let challenge = match sessions.authenticate().await? {
        AuthOutcome::Authenticated(session) => return Ok(session),
        AuthOutcome::MfaRequired(challenge) => challenge,
    };

    println!("{}", "Multi-factor authentication required.".yellow());
    for attempt in 1..=MAX_MFA_ATTEMPTS {
        let Some(code) = read_code(&challenge)? else {
            break;
        };
        match sessions.complete_mfa(&challenge.challenge_id, &code).await {
            Ok(session) => return Ok(session),
            Err(e) if matches!(e.downcast_ref::<FitchatError>(), Some(FitchatError::Mfa(_))) => {
                eprintln!(
                    "{}",
                    format!("Code rejected ({}/{}): {}", attempt, MAX_MFA_ATTEMPTS, e).red()
                );
            }
            Err(e) => return Err(e),
        }
    }

    Err(FitchatError::MfaRequired {
        challenge_id: challenge.challenge_id,
    }
    .into())
}

/// Read an MFA code from the terminal
fn prompt_mfa_code(_challenge: &MfaChallenge) -> Result<Option<String>> {
    let mut rl = DefaultEditor::new()?;
    match rl.readline("MFA code: ") {
        Ok(line) => Ok(Some(line.trim().to_string())),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// Sync command handler
pub mod sync {
    //! `fitchat sync`: pull the lookback window into the local store.

    use super::*;
    use crate::store::LocalStore;
    use crate::sync::{ActivitySyncEngine, SyncOptions, SyncResult};

    /// Run a sync with the window and filter from `config`
    pub async fn run_sync(config: Config) -> Result<()> {
        let service = build_service(&config)?;
        let mut sessions = session_manager(&config, service.clone())?;
        authenticate_interactive(&mut sessions, prompt_mfa_code).await?;

        let store = LocalStore::new(config.storage.data_path()?);
        let mut engine =
            ActivitySyncEngine::new(service, sessions, store, SyncOptions::from(&config.sync));

        let filter = config.sync.activity_type.as_deref();
        println!(
            "Syncing the last {} days ({})...",
            config.sync.lookback_days,
            filter.unwrap_or("all types")
        );
        let result = engine.sync(config.sync.lookback_days, filter).await?;
        print_result(&result);
        Ok(())
    }

    fn print_result(result: &SyncResult) {
        println!(
            "{} {} to {}: {} fetched, {} added, {} updated, {} unchanged",
            "Sync complete".green().bold(),
            result.window_start,
            result.window_end,
            result.fetched,
            result.added,
            result.updated,
            result.unchanged
        );
        if !result.is_complete() {
            println!(
                "{}",
                format!(
                    "{} activities synced without fresh lap detail:",
                    result.failed.len()
                )
                .yellow()
            );
            for failure in &result.failed {
                println!("  - {}: {}", failure.activity_id, failure.reason);
            }
        }
    }
}

// Login / logout command handlers
pub mod auth {
    //! `fitchat login` and `fitchat logout`.

    use super::*;

    /// Log in (reusing a cached session when valid) and save the session
    pub async fn login(config: Config) -> Result<()> {
        let service = build_service(&config)?;
        let mut sessions = session_manager(&config, service)?;
        let session = authenticate_interactive(&mut sessions, prompt_mfa_code).await?;

        println!("{}", "Logged in.".green().bold());
        if let Some(expires_at) = session.expires_at {
            println!("Session valid until {}", expires_at.format("%Y-%m-%d %H:%M UTC"));
        }
        println!(
            "Saved to {}",
            config.storage.credentials_path()?.display()
        );
        Ok(())
    }

    /// Delete the saved session
    pub fn logout(config: Config) -> Result<()> {
        let store = CredentialStore::new(config.storage.credentials_path()?);
        store.delete()?;
        println!("{}", "Logged out; saved session removed.".green());
        Ok(())
    }
}

// Status command handler
pub mod status {
    //! `fitchat status`: local store and session overview, no network.

    use super::*;
    use crate::store::LocalStore;

    /// Print store and session status
    pub fn show_status(config: &Config) -> Result<()> {
        let data_path = config.storage.data_path()?;
        println!("{}", "Local store".bold());
        println!("  File:        {}", data_path.display());
        match LocalStore::new(&data_path).load() {
            Ok(snapshot) => {
                let stats = snapshot.stats();
                println!("  Activities:  {}", stats.activity_count);
                println!("  Laps:        {}", stats.lap_count);
                if let (Some(first), Some(last)) = (stats.first_activity, stats.last_activity) {
                    println!("  Range:       {} to {}", first, last);
                }
                match stats.last_sync {
                    Some(at) => println!("  Last sync:   {}", at.format("%Y-%m-%d %H:%M UTC")),
                    None => println!("  Last sync:   {}", "never".yellow()),
                }
            }
            Err(e) => println!("  {}", e.to_string().red()),
        }

        let credentials_path = config.storage.credentials_path()?;
        println!("{}", "Session".bold());
        println!("  File:        {}", credentials_path.display());
        let session_line = match CredentialStore::new(&credentials_path).load()? {
            None => "not logged in".yellow(),
            Some(session) if !session.is_expired() => "valid".green(),
            Some(session) if session.can_refresh() => "expired (refreshable)".yellow(),
            Some(_) => "expired".red(),
        };
        println!("  Status:      {}", session_line);

        println!("{}", "Chat".bold());
        let model = match config.provider.provider_type.as_str() {
            "ollama" => config.provider.ollama.model.as_str(),
            _ => config.provider.gemini.model.as_str(),
        };
        println!(
            "  Provider:    {} ({})",
            config.provider.provider_type, model
        );
        println!("  Budget:      {} chars", config.chat.context_budget_chars);
        Ok(())
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat over the local store.
    //!
    //! Builds the grounding context, opens a [`ChatSession`] with the
    //! configured provider and runs a readline loop until the user exits or
    //! the provider fails permanently.

    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::*;
    use crate::chat::{
        ChatContextBuilder, ChatSession, ChatSessionConfig, GroundingContext, SessionState,
    };
    use crate::providers::{create_provider, ChatProvider};
    use crate::store::LocalStore;

    /// Start interactive chat
    ///
    /// # Errors
    ///
    /// - `NoDataAvailable` if the local store is empty
    /// - `StoreCorruption` if it cannot be read
    /// - provider construction errors (unknown type, missing API key)
    pub async fn run_chat(config: Config) -> Result<()> {
        let store = LocalStore::new(config.storage.data_path()?);
        let context = load_context(&store, config.chat.context_budget_chars)?;

        let provider: Arc<dyn ChatProvider> = Arc::from(create_provider(&config.provider, None)?);
        let mut session = ChatSession::new(provider, ChatSessionConfig::from(&config));
        session.start(context)?;

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(&session);

        loop {
            match rl.readline(&format!("{} ", "fitchat>".cyan().bold())) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::Help) => {
                            print_help();
                            continue;
                        }
                        Ok(SpecialCommand::ShowStatus) => {
                            print_status_info(&session);
                            continue;
                        }
                        Ok(SpecialCommand::Reload) => {
                            let reloaded = load_context(&store, config.chat.context_budget_chars)
                                .and_then(|ctx| session.reground(ctx));
                            match reloaded {
                                Ok(()) => println!(
                                    "{}\n",
                                    describe_context(session.context()).green()
                                ),
                                Err(e) => eprintln!("{}\n", format!("Reload failed: {}", e).red()),
                            }
                            continue;
                        }
                        Ok(SpecialCommand::Exit) => break,
                        Ok(SpecialCommand::None) => {}
                        Err(e) => {
                            eprintln!("{}\n", e.to_string().red());
                            continue;
                        }
                    }

                    match session.ask(trimmed).await {
                        Ok(answer) => println!("\n{}\n", answer),
                        Err(e) => {
                            eprintln!("{}\n", format!("Error: {}", e).red());
                            if session.state() == SessionState::Closed {
                                break;
                            }
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        session.close();
        println!("Goodbye!");
        Ok(())
    }

    fn load_context(store: &LocalStore, budget: usize) -> Result<GroundingContext> {
        let snapshot = store.load()?;
        Ok(ChatContextBuilder::build(&snapshot, budget))
    }

    fn describe_context(context: Option<&GroundingContext>) -> String {
        match context {
            None => "No activity data loaded".to_string(),
            Some(ctx) if ctx.truncated => format!(
                "Loaded {} of {} activities ({} omitted to fit {} chars)",
                ctx.included_activities,
                ctx.total_activities,
                ctx.omitted_activities,
                ctx.char_len()
            ),
            Some(ctx) => format!("Loaded {} activities", ctx.total_activities),
        }
    }

    fn print_welcome_banner(session: &ChatSession) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                fitchat - Ask about your training             ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!(
            "Provider: {} ({})",
            session.provider_name().cyan(),
            session.model()
        );
        println!("{}", describe_context(session.context()));
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    fn print_status_info(session: &ChatSession) {
        println!("\n{}", "Session Status".bold());
        println!("  Provider:  {} ({})", session.provider_name(), session.model());
        println!("  State:     {}", session.state());
        println!("  Turns:     {}", session.conversation().len());
        println!("  Grounding: {}", describe_context(session.context()));
        println!();
    }

}
