//! On-disk persistence of the reusable session token
//!
//! The credential file is a single JSON document holding a [`Session`].
//! This module only reads, writes and deletes it; deciding whether the
//! token is still usable is the session manager's job.

use std::path::{Path, PathBuf};

use crate::auth::Session;
use crate::error::Result;
use crate::store::atomic::write_atomic;

/// File-backed store for the current [`Session`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store backed by `path`. Nothing is touched until the first
    /// load or save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the credential file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached session.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when no credential file exists, or when it exists but does
    /// not contain a usable session (a fresh login will overwrite it).
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file exists but cannot be read
    pub fn load(&self) -> Result<Option<Session>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No cached credentials");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Session>(&contents) {
            Ok(session) if !session.access_token.is_empty() => Ok(Some(session)),
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "Cached credentials have an empty token; ignoring");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Cached credentials are unreadable, ignoring: {}", e);
                Ok(None)
            }
        }
    }

    /// Persist `session`, replacing any previous credentials atomically.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Serialization` if the file cannot be written
    pub fn save(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_vec_pretty(session)?;
        write_atomic(&self.path, &json)?;
        tracing::debug!(path = %self.path.display(), "Saved credentials");
        Ok(())
    }

    /// Remove the credential file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file exists but cannot be removed
    pub fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Deleted credentials");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
