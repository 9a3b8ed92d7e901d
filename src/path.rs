//! Path model for the virtual tree
//!
//! Paths are stored as plain strings: forward-slash separated, no leading or
//! trailing separator, with the root spelled as the empty string. Every
//! path-bearing operation normalizes through [`TreePath`] once, so the
//! storage layer never sees `.`/`..` segments or backslashes.

use crate::error::{Result, TreeError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path separator used in `parent_path` and full paths.
pub const SEP: char = '/';

/// A normalized absolute path within one tree.
///
/// Invariant: the inner string is either empty (the root) or a `/`-joined
/// sequence of non-empty segments, none of which is `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreePath(String);

impl TreePath {
    /// The tree root (empty path).
    pub fn root() -> Self {
        TreePath(String::new())
    }

    /// Parse and normalize a raw path.
    ///
    /// Accepts `\` as a separator, collapses repeated separators, resolves
    /// `.` segments and resolves `..` lexically. A `..` that would climb
    /// above the root is an access error, not a silent clamp.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments: Vec<&str> = Vec::new();
        for seg in raw.split(['/', '\\']) {
            match seg {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(TreeError::AccessDenied(format!(
                            "path escapes the tree root: {raw}"
                        )));
                    }
                }
                s => segments.push(s),
            }
        }
        Ok(TreePath(segments.join("/")))
    }

    /// Borrow the normalized form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into `(parent_path, filename)`. The root has no filename and
    /// splits into `("", "")`.
    pub fn split(&self) -> (TreePath, &str) {
        match self.0.rfind(SEP) {
            Some(idx) => (TreePath(self.0[..idx].to_string()), &self.0[idx + 1..]),
            None if self.0.is_empty() => (TreePath::root(), ""),
            None => (TreePath::root(), &self.0),
        }
    }

    /// Append one segment. The segment must not contain separators.
    pub fn join(&self, name: &str) -> TreePath {
        if self.0.is_empty() {
            TreePath(name.to_string())
        } else {
            TreePath(format!("{}/{}", self.0, name))
        }
    }

    /// True when `self` is `other` or nested anywhere under it.
    pub fn is_within(&self, other: &TreePath) -> bool {
        if other.0.is_empty() {
            return true;
        }
        self.0 == other.0
            || (self.0.len() > other.0.len()
                && self.0.starts_with(&other.0)
                && self.0.as_bytes()[other.0.len()] == SEP as u8)
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Join a parent path string with a filename, treating `""` as the root.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Containment check applied to every path-bearing operation.
///
/// Both arguments are canonicalized; the target must be the root itself or
/// strictly nested under it. This is the sole defense against `..`-style
/// traversal, so callers must run it before touching storage.
pub fn check_access(path: &str, root: &str) -> Result<TreePath> {
    let root = TreePath::parse(root)?;
    let target = TreePath::parse(path)?;
    if target.is_within(&root) {
        Ok(target)
    } else {
        Err(TreeError::AccessDenied(format!(
            "path {path:?} is outside the configured root {:?}",
            root.as_str()
        )))
    }
}
