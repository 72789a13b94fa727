//! Authentication against the remote activity service
//!
//! - [`session`]: token material and expiry rules
//! - [`credential_store`]: JSON file persistence of the current session
//! - [`manager`]: login, second factor, refresh and logout

pub mod credential_store;
pub mod manager;
pub mod session;

pub use credential_store::CredentialStore;
pub use manager::{AuthOutcome, Credentials, SessionManager};
pub use session::{MfaChallenge, MfaState, Session};
