//! Node and scope types
//!
//! A node is one row of the flat table: a file or a directory, positioned by
//! `(root_key, parent_path, filename)`. There is no child pointer anywhere;
//! the hierarchy is reconstructed entirely from path strings.

use crate::path::join_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owner id used for unauthenticated public access.
pub const ANONYMOUS_OWNER: i64 = 0;

/// Caller identity plus the tree the operation targets.
///
/// The authentication layer resolves both before calling in; the core only
/// ever sees the resolved values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub owner_id: i64,
    pub root_key: String,
}

impl Scope {
    pub fn new(owner_id: i64, root_key: impl Into<String>) -> Self {
        Self {
            owner_id,
            root_key: root_key.into(),
        }
    }

    /// Scope for public, unauthenticated access.
    pub fn anonymous(root_key: impl Into<String>) -> Self {
        Self::new(ANONYMOUS_OWNER, root_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
}

/// File payload. Exactly one representation exists per node, selected by the
/// extension classifier at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Binary(Vec<u8>),
}

impl Content {
    pub fn len(&self) -> usize {
        match self {
            Content::Text(s) => s.len(),
            Content::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Content::Binary(_))
    }

    /// Raw bytes regardless of representation.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Text(s) => s.into_bytes(),
            Content::Binary(b) => b,
        }
    }

    /// Text view; `None` for binary payloads.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Binary(_) => None,
        }
    }
}

/// Stat record for one node, content omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMeta {
    pub id: i64,
    pub parent_path: String,
    pub filename: String,
    pub kind: NodeKind,
    pub is_binary: bool,
    pub content_type: String,
    pub size_bytes: i64,
    pub is_public: bool,
    pub created_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
}

impl NodeMeta {
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Absolute path of this node within its tree.
    pub fn full_path(&self) -> String {
        join_path(&self.parent_path, &self.filename)
    }
}

/// Outcome of a batch operation. One item's failure never aborts the rest;
/// the counts and the error list report exactly what happened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub total: usize,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    pub fn record_ok(&mut self) {
        self.succeeded += 1;
        self.total += 1;
    }

    pub fn record_err(&mut self, message: impl Into<String>) {
        self.total += 1;
        self.errors.push(message.into());
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.succeeded += other.succeeded;
        self.total += other.total;
        self.errors.extend(other.errors);
    }

    pub fn all_succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}
