//! # vstash-path
//!
//! Traversal-safe path handling for the vstash storage tree.
//!
//! Every path that arrives from a client (URL segments, token scopes, CLI
//! arguments) is turned into a [`CanonicalPath`] by [`canonicalize`] before it
//! is compared against a token scope or touches the filesystem.
//!
//! A canonical path:
//! - is relative to the storage root (`""` is the root itself)
//! - uses `/` as its only separator
//! - contains no empty, `.` or `..` segments
//!
//! [`to_absolute`] is the single place a canonical path becomes a real
//! filesystem location.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while canonicalizing untrusted input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path contains a NUL byte")]
    NulByte,

    #[error("path escapes the storage root: {0}")]
    Traversal(String),

    #[error("invalid path segment: {0:?}")]
    InvalidSegment(String),
}

pub type Result<T> = std::result::Result<T, PathError>;

/// A normalized, root-relative path. Construct with [`canonicalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalPath(String);

/// Normalize an untrusted path string.
///
/// - `\` and `/` are both treated as separators
/// - a leading separator is dropped (`/docs/a` is `docs/a`)
/// - empty and `.` segments collapse away
/// - any `..` segment is rejected, wherever it appears
///
/// An empty input, `/` or `.` yields the root path `""`.
pub fn canonicalize(raw: &str) -> Result<CanonicalPath> {
    if raw.as_bytes().contains(&0) {
        return Err(PathError::NulByte);
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return Err(PathError::Traversal(raw.to_string())),
            s if !is_plain_segment(s) => return Err(PathError::InvalidSegment(s.to_string())),
            s => segments.push(s),
        }
    }

    Ok(CanonicalPath(segments.join("/")))
}

/// A segment the host OS treats as one ordinary name (rules out drive
/// prefixes like `C:` on Windows).
fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Join a canonical path onto the storage root.
pub fn to_absolute(path: &CanonicalPath, root: &Path) -> PathBuf {
    let mut abs = root.to_path_buf();
    for segment in path.segments() {
        abs.push(segment);
    }
    abs
}

impl CanonicalPath {
    /// The storage root itself.
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path segments from the root downwards. Empty for the root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Parent path, `None` for the root.
    pub fn parent(&self) -> Option<CanonicalPath> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(idx) => CanonicalPath(self.0[..idx].to_string()),
            None => CanonicalPath::root(),
        })
    }

    /// Proper ancestors, nearest first, ending with the root.
    pub fn ancestors(&self) -> impl Iterator<Item = CanonicalPath> {
        std::iter::successors(self.parent(), |p| p.parent())
    }

    /// True when `self` lies strictly below `dir`.
    pub fn is_below(&self, dir: &CanonicalPath) -> bool {
        if dir.is_root() {
            return !self.is_root();
        }
        self.0
            .strip_prefix(dir.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Append one directory entry name.
    pub fn join(&self, name: &str) -> Result<CanonicalPath> {
        if name.contains(['/', '\\', '\0']) || !is_plain_segment(name) {
            return Err(PathError::InvalidSegment(name.to_string()));
        }
        if self.is_root() {
            Ok(CanonicalPath(name.to_string()))
        } else {
            Ok(CanonicalPath(format!("{}/{}", self.0, name)))
        }
    }

    /// The path with a leading `/`, e.g. `/docs/a.txt`; the root is `/`.
    pub fn rooted(&self) -> String {
        format!("/{}", self.0)
    }

    pub fn to_absolute(&self, root: &Path) -> PathBuf {
        to_absolute(self, root)
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CanonicalPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self> {
        canonicalize(s)
    }
}

impl TryFrom<String> for CanonicalPath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self> {
        canonicalize(&s)
    }
}

impl From<CanonicalPath> for String {
    fn from(p: CanonicalPath) -> Self {
        p.0
    }
}
