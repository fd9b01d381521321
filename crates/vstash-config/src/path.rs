//! Path helpers for configured locations.
//!
//! Config values such as `tokens.db_path` may be written with a leading `~`;
//! everything that opens a configured path goes through [`expand_home`] first.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Expand a leading `~` to the user's home directory.
///
/// Paths without a leading `~` (or when no home directory is known) are
/// returned unchanged.
///
/// # Example
/// ```ignore
/// let db = expand_home("~/.vstash/tokens.lmdb");
/// assert!(db.is_absolute());
/// ```
pub fn expand_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Expand and create a directory, returning its absolute location.
///
/// Used for the storage root and the LMDB environment, which must both exist
/// before the server accepts requests.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = expand_home(path);
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    path.canonicalize()
        .with_context(|| format!("Failed to resolve directory: {}", path.display()))
}
