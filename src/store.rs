//! The `TreeStore` trait
//!
//! One minimal interface, two backends: the relational store (the real
//! multi-tenant one) and a local-disk passthrough for single-tenant
//! deployments. The ordering, paste, archive and search engines are written
//! against this trait only, so both backends get them for free.
//!
//! Path arguments are normalized `(parent_path, filename)` pairs as produced
//! by [`crate::path::TreePath::split`]; `""` is the root. Containment
//! checking happens above this layer, in the facade.

use crate::error::Result;
use crate::node::{Content, NodeMeta, Scope};
use async_trait::async_trait;

/// Core trait implemented by all backends.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// True when `(parent, name)` resolves to a node visible to the scope.
    async fn exists(&self, scope: &Scope, parent: &str, name: &str) -> Result<bool>;

    /// Metadata for one node. `NotFound` when absent or invisible.
    async fn stat(&self, scope: &Scope, parent: &str, name: &str) -> Result<NodeMeta>;

    /// Content of a file node, decoded from whichever column the extension
    /// classifier selected at write time.
    async fn read_file(&self, scope: &Scope, parent: &str, name: &str) -> Result<Content>;

    /// Upsert a file: write-if-absent, overwrite-if-present. Text or binary
    /// is chosen by the extension classifier; `content_type` and
    /// `size_bytes` are recorded to match.
    async fn write_file(
        &self,
        scope: &Scope,
        parent: &str,
        name: &str,
        data: &[u8],
    ) -> Result<NodeMeta>;

    /// Create a directory. With `recursive`, missing ancestors are created
    /// and an already-existing directory is not an error (mkdir -p).
    async fn mkdir(&self, scope: &Scope, parent: &str, name: &str, recursive: bool) -> Result<()>;

    /// Delete a file node.
    async fn unlink(&self, scope: &Scope, parent: &str, name: &str) -> Result<()>;

    /// Delete a directory. Non-recursive fails with `NotEmpty` when any
    /// child exists; recursive removes the directory and every transitive
    /// descendant as one atomic operation.
    async fn rmdir(&self, scope: &Scope, parent: &str, name: &str, recursive: bool) -> Result<()>;

    /// Rename and/or move one node. Fails with `Conflict` when the
    /// destination tuple is occupied. For directories the backend rewrites
    /// every descendant's `parent_path` in the same transaction, leaving
    /// descendant content and timestamps untouched.
    async fn rename(
        &self,
        scope: &Scope,
        old_parent: &str,
        old_name: &str,
        new_parent: &str,
        new_name: &str,
    ) -> Result<()>;

    /// Children of a directory, ordinal ascending, filename ascending as the
    /// tiebreak; entries without an ordinal prefix sort after ordered ones.
    async fn readdir(&self, scope: &Scope, parent: &str) -> Result<Vec<NodeMeta>>;

    /// Toggle the public flag. With `recursive` on a directory, every
    /// descendant is flagged in the same atomic operation; without it,
    /// descendants are deliberately left untouched.
    async fn set_public(
        &self,
        scope: &Scope,
        parent: &str,
        name: &str,
        value: bool,
        recursive: bool,
    ) -> Result<()>;
}

/// Order a listing the way `readdir` promises: ordinal ascending, then
/// filename. Shared by both backends.
pub(crate) fn sort_listing(entries: &mut [NodeMeta]) {
    entries.sort_by_cached_key(|e| crate::ordinal::sibling_sort_key(&e.filename));
}
