//! Paste / batch-move engine
//!
//! Moves a set of items into a target directory at an insertion ordinal.
//! Items already in the target directory are a reorder, not a move, and need
//! a temporary-name detour: the shift predicate would otherwise see and
//! shift the very items being relocated. Cross-directory items are renamed
//! straight into their slot; the store's rename handles descendant remapping
//! when the item is itself a directory.
//!
//! Per-item failures are recorded and do not abort the batch.

use crate::error::{Result, TreeError};
use crate::node::{BatchOutcome, Scope};
use crate::ordinal::{ORDINAL_WIDTH, display_name, with_ordinal};
use crate::path::{TreePath, join_path};
use crate::shift::shift_ordinals_down;
use crate::store::TreeStore;
use tracing::{debug, warn};

/// Default insertion point: the top of the directory.
pub const TOP_ORDINAL: u32 = 0;

struct PasteItem {
    parent: String,
    name: String,
    /// Temporary name while parked, same-folder items only.
    parked_as: Option<String>,
}

/// Move `items` (absolute source paths) into `target_dir`, occupying
/// consecutive ordinals starting at `insert_at` (default: top). Items are
/// assigned slots in lexical filename order for determinism.
pub async fn paste(
    store: &dyn TreeStore,
    scope: &Scope,
    items: &[String],
    target_dir: &str,
    insert_at: Option<u32>,
) -> Result<BatchOutcome> {
    let from_ordinal = insert_at.unwrap_or(TOP_ORDINAL);
    let mut outcome = BatchOutcome::default();

    let mut parsed: Vec<PasteItem> = Vec::with_capacity(items.len());
    for raw in items {
        match TreePath::parse(raw) {
            Ok(path) if !path.is_root() => {
                let (parent, name) = path.split();
                parsed.push(PasteItem {
                    parent: parent.as_str().to_string(),
                    name: name.to_string(),
                    parked_as: None,
                });
            }
            Ok(_) => outcome.record_err(format!("cannot paste the root: {raw}")),
            Err(e) => outcome.record_err(format!("{raw}: {e}")),
        }
    }
    // Deterministic ordinal assignment.
    parsed.sort_by(|a, b| a.name.cmp(&b.name));

    // Park same-folder items under temporary, non-ordinal names so the
    // shift below does not try to move them too.
    let mut viable: Vec<PasteItem> = Vec::with_capacity(parsed.len());
    for (idx, mut item) in parsed.into_iter().enumerate() {
        if item.parent == target_dir {
            let temp = format!(".paste-{idx}-{}", display_name(&item.name));
            match store
                .rename(scope, &item.parent, &item.name, target_dir, &temp)
                .await
            {
                Ok(()) => {
                    item.parked_as = Some(temp);
                    viable.push(item);
                }
                Err(e) => {
                    warn!(item = %join_path(&item.parent, &item.name), %e, "paste: parking failed");
                    outcome.record_err(format!("{}: {e}", join_path(&item.parent, &item.name)));
                }
            }
        } else {
            viable.push(item);
        }
    }

    shift_ordinals_down(store, scope, viable.len() as u32, target_dir, from_ordinal, &[]).await?;

    for (slot, item) in viable.into_iter().enumerate() {
        let final_name = with_ordinal(
            from_ordinal + slot as u32,
            ORDINAL_WIDTH,
            display_name(&item.name),
        );
        let source_path = join_path(&item.parent, &item.name);
        let result = match &item.parked_as {
            Some(temp) => {
                store
                    .rename(scope, target_dir, temp, target_dir, &final_name)
                    .await
            }
            None => {
                relocate(store, scope, &item.parent, &item.name, target_dir, &final_name).await
            }
        };
        match result {
            Ok(()) => {
                debug!(from = %source_path, to = %join_path(target_dir, &final_name), "pasted");
                outcome.record_ok();
            }
            Err(e) => {
                // Give a parked item its real name back; leaving the
                // temporary name behind would lose the filename for good.
                if let Some(temp) = &item.parked_as {
                    if let Err(restore) = store
                        .rename(scope, target_dir, temp, target_dir, &item.name)
                        .await
                    {
                        warn!(item = %source_path, %restore, "paste: restore after failure failed");
                    }
                }
                warn!(item = %source_path, %e, "paste: item failed");
                outcome.record_err(format!("{source_path}: {e}"));
            }
        }
    }
    Ok(outcome)
}

/// Cross-folder move of one item. The source is looked up directly; when the
/// direct tuple is gone (the caller held a stale clipboard path) a recursive
/// search by filename locates it before giving up.
async fn relocate(
    store: &dyn TreeStore,
    scope: &Scope,
    src_parent: &str,
    src_name: &str,
    target_dir: &str,
    final_name: &str,
) -> Result<()> {
    let (parent, name) = if store.exists(scope, src_parent, src_name).await? {
        (src_parent.to_string(), src_name.to_string())
    } else {
        match find_by_name(store, scope, src_name).await? {
            Some(meta) => (meta.parent_path, meta.filename),
            None => {
                return Err(TreeError::NotFound(join_path(src_parent, src_name)));
            }
        }
    };
    if store.exists(scope, target_dir, final_name).await? {
        return Err(TreeError::Conflict(join_path(target_dir, final_name)));
    }
    store
        .rename(scope, &parent, &name, target_dir, final_name)
        .await
}

/// Breadth-first search of the whole tree for an exact filename.
async fn find_by_name(
    store: &dyn TreeStore,
    scope: &Scope,
    name: &str,
) -> Result<Option<crate::node::NodeMeta>> {
    let mut worklist = vec![String::new()];
    while let Some(dir) = worklist.pop() {
        for entry in store.readdir(scope, &dir).await? {
            if entry.filename == name {
                return Ok(Some(entry));
            }
            if entry.is_directory() {
                worklist.push(entry.full_path());
            }
        }
    }
    Ok(None)
}
