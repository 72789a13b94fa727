//! fitchat - personal activity sync and grounded LLM chat
//!
//! This library pulls fitness-activity history from a remote service into a
//! durable local store and answers questions about it with an LLM grounded
//! on that data.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Session lifecycle, MFA, and the on-disk credential store
//! - `remote`: Activity service trait, HTTP adapter, in-memory fake, retry
//! - `sync`: Paginated sync engine and its result types
//! - `store`: Snapshot model, merge, and atomic persistence
//! - `chat`: Budgeted grounding context and the chat session state machine
//! - `providers`: LLM provider abstraction (Ollama, Gemini)
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface and handlers
//!
//! # Example
//!
//! ```no_run
//! use fitchat::chat::ChatContextBuilder;
//! use fitchat::store::LocalStore;
//! use fitchat::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let snapshot = LocalStore::new(config.storage.data_path()?).load()?;
//!     let context = ChatContextBuilder::build(&snapshot, config.chat.context_budget_chars);
//!     println!("{}", context.text);
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod auth;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod providers;
pub mod remote;
pub mod store;
pub mod sync;

pub use activity::{ActivityRecord, LapRecord};
pub use config::Config;
pub use error::{FitchatError, Result};
