//! Crash-safe file replacement
//!
//! Contents are written to a temporary file in the target's directory,
//! flushed and fsynced, then renamed over the target. A reader sees either
//! the previous file or the new one, never a torn write. The temporary file
//! is removed on every failure path.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::Result;

/// Atomically replace `path` with `contents`.
///
/// Missing parent directories are created. The temporary file is created
/// with owner-only permissions on unix, which the final file inherits.
///
/// # Errors
///
/// Returns `Io` if the directory cannot be created or any write, sync or
/// rename step fails. The target is left untouched in that case.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    // Dropping the PersistError drops the temp file with it.
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::trace!(path = %path.display(), bytes = contents.len(), "Atomically replaced file");
    Ok(())
}
