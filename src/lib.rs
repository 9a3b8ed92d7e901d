//! # treesql - Virtual Hierarchical File Store
//!
//! treesql emulates a POSIX-like ordered directory tree on top of a flat
//! relational table of nodes. Sibling order lives in the filenames
//! themselves (`"0001_notes.md"`), the hierarchy lives in path strings, and
//! filesystem semantics — atomic directory moves, recursive deletes,
//! visibility cascades, path-traversal safety — are reproduced with row
//! operations alone.
//!
//! ## Backends
//!
//! - **SQLite**: the relational store, multi-tenant (async via sqlx)
//! - **Local disk**: plain-files passthrough for single-tenant deployments
//!
//! Both sit behind the [`TreeStore`] trait; the ordering, paste, archive and
//! search engines are written against the trait only.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use treesql::{Scope, SqliteStore, Vfs};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("tree.db").await?);
//!     let vfs = Vfs::new(store);
//!     let scope = Scope::new(1, "main");
//!
//!     vfs.create_folder(&scope, "", "docs", None).await?;
//!     vfs.create_file(&scope, "0000_docs", "readme.md", b"hello", None).await?;
//!     let tree = vfs.render_subtree(&scope, "", false).await?;
//!     println!("{}", serde_json::to_string_pretty(&tree)?);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod content;
pub mod error;
pub mod local;
pub mod node;
pub mod ordinal;
pub mod paste;
pub mod path;
pub mod search;
pub mod shift;
pub mod sqlite;
pub mod store;
pub mod vfs;

pub use archive::{ArchiveFormat, import_archive};
pub use error::{Result, TreeError};
pub use local::LocalStore;
pub use node::{BatchOutcome, Content, NodeKind, NodeMeta, Scope};
pub use paste::paste;
pub use path::{TreePath, check_access};
pub use search::{SearchHit, SearchMode, search};
pub use shift::{renumber_alphabetical, shift_ordinals_down};
pub use sqlite::SqliteStore;
pub use store::TreeStore;
pub use vfs::{PULLUP_SUFFIX, TreeNode, Vfs};
