//! Facade exposed to the routing layer
//!
//! One method per routed concern: subtree rendering, create/save/rename,
//! batch delete, neighbor swaps, paste, join, visibility, archive import and
//! search. Every path coming in from a request is pushed through the
//! containment check against the configured root before the store sees it;
//! the store trusts nothing upstream of this layer.

use crate::archive::{ArchiveFormat, import_archive};
use crate::error::{Result, TreeError};
use crate::node::{BatchOutcome, Scope};
use crate::ordinal::{ORDINAL_WIDTH, display_name, ordinal_of, split_ordinal, with_ordinal};
use crate::path::{TreePath, check_access, join_path};
use crate::search::{SearchHit, SearchMode, search};
use crate::shift::shift_ordinals_down;
use crate::store::TreeStore;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Directories whose display name ends in this character are inlined into
/// their parent's listing when rendering with pullup.
pub const PULLUP_SUFFIX: char = '+';

/// One rendered node of the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub name: String,
    pub create_time: DateTime<Utc>,
    pub modify_time: DateTime<Utc>,
    /// Text content; binary files and directories render without it.
    pub content: Option<String>,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

/// The virtual file store, bound to one backend and one configured root.
#[derive(Clone)]
pub struct Vfs {
    store: Arc<dyn TreeStore>,
    root: String,
}

impl Vfs {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self {
            store,
            root: String::new(),
        }
    }

    /// Confine every operation to a subtree instead of the whole tree.
    pub fn with_root(store: Arc<dyn TreeStore>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TreeStore> {
        &self.store
    }

    fn resolve(&self, raw: &str) -> Result<TreePath> {
        check_access(raw, &self.root)
    }

    /// Resolve a path that must name a node, not the root.
    fn resolve_node(&self, raw: &str) -> Result<(String, String)> {
        let path = self.resolve(raw)?;
        if path.is_root() {
            return Err(TreeError::InvalidFormat(
                "operation requires a node, got the root".to_string(),
            ));
        }
        let (parent, name) = path.split();
        Ok((parent.as_str().to_string(), name.to_string()))
    }

    // ---- rendering -------------------------------------------------------

    /// Ordered rendering of a directory subtree. With `pullup`, directories
    /// whose display name ends in [`PULLUP_SUFFIX`] are flattened into their
    /// parent instead of nesting.
    pub async fn render_subtree(
        &self,
        scope: &Scope,
        path: &str,
        pullup: bool,
    ) -> Result<Vec<TreeNode>> {
        let dir = self.resolve(path)?;
        if !dir.is_root() {
            let (parent, name) = dir.split();
            let meta = self.store.stat(scope, parent.as_str(), name).await?;
            if !meta.is_directory() {
                return Err(TreeError::InvalidFormat(format!("not a directory: {path}")));
            }
        }
        self.render_dir(scope, dir.as_str().to_string(), pullup)
            .await
    }

    fn render_dir<'a>(
        &'a self,
        scope: &'a Scope,
        dir: String,
        pullup: bool,
    ) -> BoxFuture<'a, Result<Vec<TreeNode>>> {
        async move {
            let mut out = Vec::new();
            for entry in self.store.readdir(scope, &dir).await? {
                if entry.is_directory() {
                    let children = self
                        .render_dir(scope, entry.full_path(), pullup)
                        .await?;
                    if pullup && display_name(&entry.filename).ends_with(PULLUP_SUFFIX) {
                        out.extend(children);
                    } else {
                        out.push(TreeNode {
                            name: entry.filename,
                            create_time: entry.created_time,
                            modify_time: entry.modified_time,
                            content: None,
                            mime_type: entry.content_type,
                            children: Some(children),
                        });
                    }
                } else {
                    let content = if entry.is_binary {
                        None
                    } else {
                        self.store
                            .read_file(scope, &dir, &entry.filename)
                            .await?
                            .as_text()
                            .map(str::to_string)
                    };
                    out.push(TreeNode {
                        name: entry.filename,
                        create_time: entry.created_time,
                        modify_time: entry.modified_time,
                        content,
                        mime_type: entry.content_type,
                        children: None,
                    });
                }
            }
            Ok(out)
        }
        .boxed()
    }

    // ---- create / save ---------------------------------------------------

    /// Create a file at an ordinal position (default: top). `name` is the
    /// display name; the assigned ordinal prefix is prepended here. Returns
    /// the final filename.
    pub async fn create_file(
        &self,
        scope: &Scope,
        dir: &str,
        name: &str,
        data: &[u8],
        at: Option<u32>,
    ) -> Result<String> {
        let dir = self.resolve(dir)?;
        let at = at.unwrap_or(0);
        let final_name = with_ordinal(at, ORDINAL_WIDTH, display_name(name));
        shift_ordinals_down(self.store.as_ref(), scope, 1, dir.as_str(), at, &[]).await?;
        self.store
            .write_file(scope, dir.as_str(), &final_name, data)
            .await?;
        Ok(final_name)
    }

    /// Create a folder at an ordinal position (default: top).
    pub async fn create_folder(
        &self,
        scope: &Scope,
        dir: &str,
        name: &str,
        at: Option<u32>,
    ) -> Result<String> {
        let dir = self.resolve(dir)?;
        let at = at.unwrap_or(0);
        let final_name = with_ordinal(at, ORDINAL_WIDTH, display_name(name));
        shift_ordinals_down(self.store.as_ref(), scope, 1, dir.as_str(), at, &[]).await?;
        self.store
            .mkdir(scope, dir.as_str(), &final_name, false)
            .await?;
        Ok(final_name)
    }

    /// Save content into an existing file, optionally renaming it and
    /// optionally splitting on a delimiter. When splitting, the first
    /// fragment stays in the original file and every further fragment
    /// becomes a new file ordered immediately after it, named from its first
    /// non-empty line. Returns the filenames written, saved file first.
    pub async fn save_file(
        &self,
        scope: &Scope,
        path: &str,
        content: &str,
        new_name: Option<&str>,
        split_on: Option<&str>,
    ) -> Result<Vec<String>> {
        let (dir, mut name) = self.resolve_node(path)?;
        let meta = self.store.stat(scope, &dir, &name).await?;
        if meta.is_directory() {
            return Err(TreeError::InvalidFormat(format!("not a file: {path}")));
        }

        if let Some(requested) = new_name {
            let requested = display_name(requested);
            if requested != display_name(&name) {
                // keep the current ordinal prefix, swap only the name
                let renamed = match split_ordinal(&name) {
                    Some((ord, width, _)) => with_ordinal(ord, width, requested),
                    None => requested.to_string(),
                };
                self.store
                    .rename(scope, &dir, &name, &dir, &renamed)
                    .await?;
                name = renamed;
            }
        }

        let fragments: Vec<&str> = match split_on {
            Some(delim) if !delim.is_empty() && content.contains(delim) => {
                content.split(delim).collect()
            }
            _ => vec![content],
        };

        self.store
            .write_file(scope, &dir, &name, fragments[0].as_bytes())
            .await?;
        let mut written = vec![name.clone()];

        if fragments.len() > 1 {
            let my_ordinal = ordinal_of(&name)?;
            let extension = crate::content::extension(&name);
            shift_ordinals_down(
                self.store.as_ref(),
                scope,
                (fragments.len() - 1) as u32,
                &dir,
                my_ordinal + 1,
                &[],
            )
            .await?;
            for (i, fragment) in fragments[1..].iter().enumerate() {
                let stem = split_title(fragment, i);
                let fname = match &extension {
                    Some(ext) => format!("{stem}.{ext}"),
                    None => stem,
                };
                let fname = with_ordinal(my_ordinal + 1 + i as u32, ORDINAL_WIDTH, &fname);
                self.store
                    .write_file(scope, &dir, &fname, fragment.as_bytes())
                    .await?;
                written.push(fname);
            }
            info!(path, parts = written.len(), "split file");
        }
        Ok(written)
    }

    /// Rename a folder in place, keeping its ordinal prefix.
    pub async fn rename_folder(&self, scope: &Scope, path: &str, new_name: &str) -> Result<()> {
        let (dir, name) = self.resolve_node(path)?;
        let meta = self.store.stat(scope, &dir, &name).await?;
        if !meta.is_directory() {
            return Err(TreeError::InvalidFormat(format!("not a directory: {path}")));
        }
        let requested = display_name(new_name);
        let renamed = match split_ordinal(&name) {
            Some((ord, width, _)) => with_ordinal(ord, width, requested),
            None => requested.to_string(),
        };
        self.store.rename(scope, &dir, &name, &dir, &renamed).await
    }

    // ---- delete ----------------------------------------------------------

    /// Delete files and directories (directories recursively). Per-item
    /// isolation: one failure never aborts the rest.
    pub async fn delete(&self, scope: &Scope, paths: &[String]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for raw in paths {
            let result = async {
                let (dir, name) = self.resolve_node(raw)?;
                let meta = self.store.stat(scope, &dir, &name).await?;
                if meta.is_directory() {
                    self.store.rmdir(scope, &dir, &name, true).await
                } else {
                    self.store.unlink(scope, &dir, &name).await
                }
            }
            .await;
            match result {
                Ok(()) => outcome.record_ok(),
                Err(e) => outcome.record_err(format!("{raw}: {e}")),
            }
        }
        Ok(outcome)
    }

    // ---- ordering --------------------------------------------------------

    /// Swap a node with its immediate lower-ordinal neighbor.
    pub async fn move_up(&self, scope: &Scope, path: &str) -> Result<()> {
        self.swap_with_neighbor(scope, path, true).await
    }

    /// Swap a node with its immediate higher-ordinal neighbor.
    pub async fn move_down(&self, scope: &Scope, path: &str) -> Result<()> {
        self.swap_with_neighbor(scope, path, false).await
    }

    async fn swap_with_neighbor(&self, scope: &Scope, path: &str, up: bool) -> Result<()> {
        let (dir, name) = self.resolve_node(path)?;
        let my_ordinal = ordinal_of(&name)?;
        let (_, my_width, my_display) = split_ordinal(&name).expect("checked by ordinal_of");
        let (my_width, my_display) = (my_width, my_display.to_string());

        let siblings = self.store.readdir(scope, &dir).await?;
        let neighbor = siblings
            .iter()
            .filter_map(|e| split_ordinal(&e.filename).map(|(ord, width, rest)| {
                (ord, width, rest.to_string(), e.filename.clone())
            }))
            .filter(|(ord, ..)| if up { *ord < my_ordinal } else { *ord > my_ordinal })
            .max_by_key(|(ord, ..)| if up { *ord as i64 } else { -(*ord as i64) });
        let (their_ordinal, their_width, their_display, their_name) = match neighbor {
            Some(n) => n,
            None => {
                return Err(TreeError::NotFound(format!(
                    "no {} neighbor for {path}",
                    if up { "previous" } else { "next" }
                )));
            }
        };

        // Pairwise ordinal swap through a temporary name; a direct exchange
        // would collide on the uniqueness constraint. A failure after the
        // parking step renames the parked entry back so it never keeps the
        // temporary name.
        let temp = format!(".swap-{name}");
        let their_new = with_ordinal(my_ordinal, their_width, &their_display);
        self.store.rename(scope, &dir, &name, &dir, &temp).await?;
        if let Err(e) = self
            .store
            .rename(scope, &dir, &their_name, &dir, &their_new)
            .await
        {
            if let Err(restore) = self.store.rename(scope, &dir, &temp, &dir, &name).await {
                warn!(%path, %restore, "swap: restore after failure failed");
            }
            return Err(e);
        }
        if let Err(e) = self
            .store
            .rename(
                scope,
                &dir,
                &temp,
                &dir,
                &with_ordinal(their_ordinal, my_width, &my_display),
            )
            .await
        {
            if let Err(restore) = self
                .store
                .rename(scope, &dir, &their_new, &dir, &their_name)
                .await
            {
                warn!(%path, %restore, "swap: restore after failure failed");
            } else if let Err(restore) = self.store.rename(scope, &dir, &temp, &dir, &name).await {
                warn!(%path, %restore, "swap: restore after failure failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Batch move into a target directory at an insertion ordinal.
    pub async fn paste(
        &self,
        scope: &Scope,
        items: &[String],
        target_dir: &str,
        at: Option<u32>,
    ) -> Result<BatchOutcome> {
        let target = self.resolve(target_dir)?;
        let mut outcome = BatchOutcome::default();
        let mut resolved = Vec::with_capacity(items.len());
        for raw in items {
            match self.resolve(raw) {
                Ok(path) => resolved.push(path.as_str().to_string()),
                Err(e) => outcome.record_err(format!("{raw}: {e}")),
            }
        }
        let pasted =
            crate::paste::paste(self.store.as_ref(), scope, &resolved, target.as_str(), at).await?;
        outcome.merge(pasted);
        Ok(outcome)
    }

    /// Concatenate several text files into the lowest-ordinal one and delete
    /// the rest. Returns the surviving path.
    pub async fn join_files(&self, scope: &Scope, paths: &[String]) -> Result<String> {
        if paths.len() < 2 {
            return Err(TreeError::InvalidFormat(
                "join requires at least two files".to_string(),
            ));
        }
        let mut members = Vec::with_capacity(paths.len());
        for raw in paths {
            let (dir, name) = self.resolve_node(raw)?;
            let ordinal = ordinal_of(&name)?;
            let meta = self.store.stat(scope, &dir, &name).await?;
            if meta.is_directory() || meta.is_binary {
                return Err(TreeError::InvalidFormat(format!(
                    "join only applies to text files: {raw}"
                )));
            }
            members.push((ordinal, dir, name));
        }
        members.sort_by(|a, b| a.0.cmp(&b.0));

        let mut pieces = Vec::with_capacity(members.len());
        for (_, dir, name) in &members {
            let content = self.store.read_file(scope, dir, name).await?;
            pieces.push(content.into_bytes());
        }
        let joined = pieces.join(&b'\n');

        let (_, target_dir, target_name) = &members[0];
        self.store
            .write_file(scope, target_dir, target_name, &joined)
            .await?;
        for (_, dir, name) in &members[1..] {
            self.store.unlink(scope, dir, name).await?;
        }
        info!(into = %join_path(target_dir, target_name), joined = members.len(), "joined files");
        Ok(join_path(target_dir, target_name))
    }

    // ---- visibility / import / search ------------------------------------

    pub async fn set_public(
        &self,
        scope: &Scope,
        path: &str,
        value: bool,
        recursive: bool,
    ) -> Result<()> {
        let (dir, name) = self.resolve_node(path)?;
        self.store
            .set_public(scope, &dir, &name, value, recursive)
            .await
    }

    /// Import an uploaded archive into a target directory. The format is
    /// detected from the uploaded filename.
    pub async fn import_archive(
        &self,
        scope: &Scope,
        target_dir: &str,
        upload_name: &str,
        data: &[u8],
    ) -> Result<BatchOutcome> {
        let format = ArchiveFormat::from_name(upload_name)?;
        let target = self.resolve(target_dir)?;
        import_archive(self.store.as_ref(), scope, target.as_str(), format, data).await
    }

    pub async fn search_text(
        &self,
        scope: &Scope,
        query: &str,
        scope_path: &str,
        mode: SearchMode,
    ) -> Result<Vec<SearchHit>> {
        let path = self.resolve(scope_path)?;
        search(self.store.as_ref(), scope, query, path.as_str(), mode).await
    }
}

/// Title for a split-off fragment: first non-empty line, markdown heading
/// markers stripped, unsafe characters removed, bounded length. The fragment
/// index keeps generated names unique when titles repeat.
fn split_title(fragment: &str, index: usize) -> String {
    let title = fragment
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .trim_start_matches('#')
        .trim();
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '"' | ':' | '*' | '?' | '<' | '>' | '|'))
        .take(48)
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        format!("untitled-{}", index + 1)
    } else {
        cleaned
    }
}
