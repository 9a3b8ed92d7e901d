//! Ordinal shift engine
//!
//! Opens a contiguous gap in a directory's ordinal sequence by renaming
//! every sibling at or after the insertion point. Processing runs highest
//! ordinal first: incrementing upward would momentarily collide with the
//! next, not-yet-shifted sibling and trip the uniqueness constraint.

use crate::error::Result;
use crate::node::Scope;
use crate::ordinal::{display_name, split_ordinal, with_ordinal};
use crate::store::TreeStore;
use std::collections::HashMap;
use tracing::debug;

/// Shift every sibling of `dir` whose ordinal is >= `from_ordinal` down by
/// `slots`, preserving each filename's original zero-padding width.
/// Filenames listed in `ignore` (and entries without an ordinal prefix) are
/// left alone.
///
/// Returns the old -> new filename mapping so callers that inserted into the
/// freed gap can track identity without re-listing.
pub async fn shift_ordinals_down(
    store: &dyn TreeStore,
    scope: &Scope,
    slots: u32,
    dir: &str,
    from_ordinal: u32,
    ignore: &[String],
) -> Result<HashMap<String, String>> {
    let mut renamed = HashMap::new();
    if slots == 0 {
        return Ok(renamed);
    }

    let mut shifting: Vec<(u32, usize, String)> = store
        .readdir(scope, dir)
        .await?
        .into_iter()
        .filter(|e| !ignore.contains(&e.filename))
        .filter_map(|e| {
            let (ord, width, _) = split_ordinal(&e.filename)?;
            (ord >= from_ordinal).then(|| (ord, width, e.filename))
        })
        .collect();
    shifting.sort_by(|a, b| b.0.cmp(&a.0));

    for (ord, width, filename) in shifting {
        let new_name = with_ordinal(ord + slots, width, display_name(&filename));
        store.rename(scope, dir, &filename, dir, &new_name).await?;
        renamed.insert(filename, new_name);
    }
    debug!(dir, slots, from_ordinal, moved = renamed.len(), "shifted ordinals");
    Ok(renamed)
}

/// Re-sort a directory: children ordered alphabetically by their name
/// without the ordinal prefix, then renumbered densely from zero.
///
/// Runs in two passes. New names could collide with current ones (a child
/// may already hold the ordinal another child is headed for), so the first
/// pass parks everything at offset ordinals above the current maximum and
/// the second pass assigns the final `0, 1, 2, ...` sequence.
pub async fn renumber_alphabetical(
    store: &dyn TreeStore,
    scope: &Scope,
    dir: &str,
) -> Result<()> {
    let entries = store.readdir(scope, dir).await?;
    if entries.is_empty() {
        return Ok(());
    }

    let max_ordinal = entries
        .iter()
        .filter_map(|e| split_ordinal(&e.filename).map(|(ord, _, _)| ord))
        .max()
        .unwrap_or(0);
    let offset = max_ordinal + 1;

    let mut children: Vec<(String, String)> = entries
        .into_iter()
        .map(|e| {
            let display = display_name(&e.filename).to_string();
            (e.filename, display)
        })
        .collect();
    children.sort_by(|a, b| a.1.cmp(&b.1));

    // Pass 1: park at collision-free offset ordinals.
    let mut parked = Vec::with_capacity(children.len());
    for (idx, (filename, display)) in children.into_iter().enumerate() {
        let temp = with_ordinal(offset + idx as u32, crate::ordinal::ORDINAL_WIDTH, &display);
        store.rename(scope, dir, &filename, dir, &temp).await?;
        parked.push((temp, display));
    }

    // Pass 2: final dense sequence.
    for (idx, (temp, display)) in parked.into_iter().enumerate() {
        let fin = with_ordinal(idx as u32, crate::ordinal::ORDINAL_WIDTH, &display);
        if temp != fin {
            store.rename(scope, dir, &temp, dir, &fin).await?;
        }
    }
    debug!(dir, "renumbered directory alphabetically");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Scope;
    use crate::sqlite::SqliteStore;

    fn scope() -> Scope {
        Scope::new(1, "main")
    }

    async fn listing(store: &SqliteStore, s: &Scope, dir: &str) -> Vec<String> {
        store
            .readdir(s, dir)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.filename)
            .collect()
    }

    #[tokio::test]
    async fn shift_opens_gap_and_keeps_density() {
        let store = SqliteStore::memory().await.unwrap();
        let s = scope();
        store.mkdir(&s, "", "d", false).await.unwrap();
        for name in ["0001_a.md", "0002_b.md", "0003_c.md"] {
            store.write_file(&s, "d", name, b"x").await.unwrap();
        }

        let renamed = shift_ordinals_down(&store, &s, 2, "d", 2, &[])
            .await
            .unwrap();
        assert_eq!(renamed.get("0002_b.md").unwrap(), "0004_b.md");
        assert_eq!(renamed.get("0003_c.md").unwrap(), "0005_c.md");
        assert_eq!(
            listing(&store, &s, "d").await,
            vec!["0001_a.md", "0004_b.md", "0005_c.md"]
        );
    }

    #[tokio::test]
    async fn shift_never_collides_with_dense_siblings() {
        let store = SqliteStore::memory().await.unwrap();
        let s = scope();
        store.mkdir(&s, "", "d", false).await.unwrap();
        // Densely packed: an ascending shift would collide immediately.
        for i in 1..=20u32 {
            let name = crate::ordinal::with_ordinal(i, 4, &format!("f{i}.md"));
            store.write_file(&s, "d", &name, b"x").await.unwrap();
        }
        shift_ordinals_down(&store, &s, 1, "d", 1, &[]).await.unwrap();
        let names = listing(&store, &s, "d").await;
        assert_eq!(names.first().unwrap(), "0002_f1.md");
        assert_eq!(names.last().unwrap(), "0021_f20.md");
    }

    #[tokio::test]
    async fn shift_preserves_legacy_padding_width() {
        let store = SqliteStore::memory().await.unwrap();
        let s = scope();
        store.mkdir(&s, "", "d", false).await.unwrap();
        store.write_file(&s, "d", "000007_old.md", b"x").await.unwrap();
        let renamed = shift_ordinals_down(&store, &s, 1, "d", 0, &[])
            .await
            .unwrap();
        assert_eq!(renamed.get("000007_old.md").unwrap(), "000008_old.md");
    }

    #[tokio::test]
    async fn shift_skips_ignored_and_unprefixed_entries() {
        let store = SqliteStore::memory().await.unwrap();
        let s = scope();
        store.mkdir(&s, "", "d", false).await.unwrap();
        for name in ["0001_a.md", "0002_b.md", "notes.txt"] {
            store.write_file(&s, "d", name, b"x").await.unwrap();
        }

        let renamed = shift_ordinals_down(&store, &s, 1, "d", 0, &["0001_a.md".to_string()])
            .await
            .unwrap();
        assert_eq!(renamed.len(), 1);
        assert_eq!(renamed.get("0002_b.md").unwrap(), "0003_b.md");
        assert!(store.exists(&s, "d", "0001_a.md").await.unwrap());
        assert!(store.exists(&s, "d", "notes.txt").await.unwrap());
    }

    #[tokio::test]
    async fn renumber_sorts_alphabetically_dense_from_zero() {
        let store = SqliteStore::memory().await.unwrap();
        let s = scope();
        store.mkdir(&s, "", "d", false).await.unwrap();
        for name in ["0005_zebra.md", "plain.md", "0001_mango.md"] {
            store.write_file(&s, "d", name, b"x").await.unwrap();
        }
        renumber_alphabetical(&store, &s, "d").await.unwrap();
        assert_eq!(
            listing(&store, &s, "d").await,
            vec!["0000_mango.md", "0001_plain.md", "0002_zebra.md"]
        );
    }
}
