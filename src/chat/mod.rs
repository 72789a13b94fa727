//! Grounded chat over the local activity store
//!
//! [`ChatContextBuilder`] turns a snapshot into bounded text;
//! [`ChatSession`] carries that text through a multi-turn conversation.

pub mod context;
pub mod session;

pub use context::{ChatContextBuilder, GroundingContext};
pub use session::{ChatSession, ChatSessionConfig, ConversationState, SessionState, Turn};
