//! Token scopes and the matcher that decides whether a path falls inside one.
//!
//! Prefix scopes come in three shapes, fixed at issuance:
//!
//! | prefix      | grants                                   |
//! |-------------|------------------------------------------|
//! | `""`        | the whole tree, root included            |
//! | `"docs/"`   | `docs` itself and everything below it    |
//! | `"a/b.pdf"` | exactly that one path                    |
//!
//! Pattern scopes carry a regex (from signed tokens) matched against the
//! rooted form of the path (`/docs/a.txt`). Matching is unanchored, so a
//! pattern like `/docs/` also grants `/old/docs/x`; issuers anchor with `^`/`$`.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use vstash_path::{canonicalize, CanonicalPath};

use crate::{Result, TokenError};

/// What a prefix grant covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Root,
    Directory,
    File,
}

/// The set of paths a token authorizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scope {
    Prefix { prefix: String },
    Pattern { pattern: PathPattern },
}

impl Scope {
    /// Root grant: every path.
    pub fn root() -> Self {
        Scope::Prefix {
            prefix: String::new(),
        }
    }

    /// Build a prefix scope with an explicit kind.
    ///
    /// The path is canonicalized first, so `/docs/../x` is refused and
    /// `\docs\` becomes `docs/`. A directory grant on the root is a root grant.
    pub fn grant(kind: ScopeKind, raw: &str) -> Result<Self> {
        let path = canonicalize(raw)?;
        match kind {
            ScopeKind::Root if path.is_root() => Ok(Scope::root()),
            ScopeKind::Root => Err(TokenError::ScopeKindMismatch(format!(
                "root scope given a path: {path}"
            ))),
            ScopeKind::Directory if path.is_root() => Ok(Scope::root()),
            ScopeKind::Directory => Ok(Scope::Prefix {
                prefix: format!("{path}/"),
            }),
            ScopeKind::File if path.is_root() => Err(TokenError::ScopeKindMismatch(
                "file scope needs a file path".to_string(),
            )),
            ScopeKind::File => Ok(Scope::Prefix {
                prefix: path.to_string(),
            }),
        }
    }

    /// Infer the kind from the written form: empty/`/` is the root, a trailing
    /// separator is a directory, anything else one file.
    pub fn from_convention(raw: &str) -> Result<Self> {
        let kind = if canonicalize(raw)?.is_root() {
            ScopeKind::Root
        } else if raw.ends_with(['/', '\\']) {
            ScopeKind::Directory
        } else {
            ScopeKind::File
        };
        Self::grant(kind, raw)
    }

    /// Regex scope.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(Scope::Pattern {
            pattern: PathPattern::new(pattern)?,
        })
    }

    /// Kind of a prefix scope; `None` for patterns.
    pub fn kind(&self) -> Option<ScopeKind> {
        match self {
            Scope::Prefix { prefix } if prefix.is_empty() => Some(ScopeKind::Root),
            Scope::Prefix { prefix } if prefix.ends_with('/') => Some(ScopeKind::Directory),
            Scope::Prefix { .. } => Some(ScopeKind::File),
            Scope::Pattern { .. } => None,
        }
    }

    pub fn matches(&self, path: &CanonicalPath) -> bool {
        matches(self, path)
    }

    /// Directory the grant is anchored at: the granted directory, the parent
    /// of a granted file, or the root for root and pattern grants.
    ///
    /// Cleanup after a delete never climbs to or above this directory.
    pub fn base_dir(&self) -> CanonicalPath {
        match self {
            Scope::Prefix { prefix } => {
                let path = prefix
                    .strip_suffix('/')
                    .unwrap_or(prefix)
                    .parse::<CanonicalPath>()
                    .unwrap_or_else(|_| CanonicalPath::root());
                if prefix.ends_with('/') {
                    path
                } else {
                    path.parent().unwrap_or_else(CanonicalPath::root)
                }
            }
            Scope::Pattern { .. } => CanonicalPath::root(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Prefix { prefix } if prefix.is_empty() => f.write_str("/"),
            Scope::Prefix { prefix } => f.write_str(prefix),
            Scope::Pattern { pattern } => write!(f, "~{}", pattern.as_str()),
        }
    }
}

/// Decide whether `path` lies inside `scope`.
pub fn matches(scope: &Scope, path: &CanonicalPath) -> bool {
    match scope {
        Scope::Prefix { prefix } if prefix.is_empty() => true,
        Scope::Prefix { prefix } if prefix.ends_with('/') => {
            let p = path.as_str();
            // The directory itself, asked for without the trailing slash.
            p.starts_with(prefix.as_str()) || (p.len() + 1 == prefix.len() && prefix.starts_with(p))
        }
        Scope::Prefix { prefix } => path.as_str() == prefix,
        Scope::Pattern { pattern } => pattern.is_match(&path.rooted()),
    }
}

/// Compiled regex that (de)serializes as its source string.
#[derive(Clone)]
pub struct PathPattern(Regex);

impl PathPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self(Regex::new(pattern)?))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathPattern").field(&self.as_str()).finish()
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for PathPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PathPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Regex::new(&source)
            .map(PathPattern)
            .map_err(serde::de::Error::custom)
    }
}
