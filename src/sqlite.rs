//! Relational backend for the virtual tree
//!
//! One flat `nodes` table; the hierarchy lives entirely in `parent_path`
//! strings and is queried with prefix predicates. Multi-statement operations
//! that must appear atomic (directory rename with its descendant rewrite,
//! recursive delete, recursive visibility) run inside a single transaction;
//! everything else relies on the table's uniqueness constraint.

use crate::content;
use crate::error::{Result, TreeError};
use crate::node::{Content, NodeKind, NodeMeta, Scope};
use crate::path::join_path;
use crate::store::{TreeStore, sort_listing};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

const NODE_COLUMNS: &str = "id, owner_id, parent_path, filename, is_directory, is_binary, \
     content_text, content_blob, content_type, size_bytes, is_public, created_time, modified_time";

/// SQLite-backed store
///
/// Uses a sqlx connection pool; `:memory:` databases are forced onto a
/// single shared-cache connection so every handle sees the same database.
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct NodeRow {
    id: i64,
    owner_id: i64,
    parent_path: String,
    filename: String,
    is_directory: bool,
    is_binary: bool,
    content_text: Option<String>,
    content_blob: Option<Vec<u8>>,
    content_type: String,
    size_bytes: i64,
    is_public: bool,
    created_time: DateTime<Utc>,
    modified_time: DateTime<Utc>,
}

impl NodeRow {
    fn meta(&self) -> NodeMeta {
        NodeMeta {
            id: self.id,
            parent_path: self.parent_path.clone(),
            filename: self.filename.clone(),
            kind: if self.is_directory {
                NodeKind::Directory
            } else {
                NodeKind::File
            },
            is_binary: self.is_binary,
            content_type: self.content_type.clone(),
            size_bytes: self.size_bytes,
            is_public: self.is_public,
            created_time: self.created_time,
            modified_time: self.modified_time,
        }
    }

    fn visible_to(&self, scope: &Scope) -> bool {
        self.is_public || self.owner_id == scope.owner_id
    }

    fn owned_by(&self, scope: &Scope) -> bool {
        self.owner_id == scope.owner_id
    }
}

/// Escape `%`, `_` and `\` so a path can be used as a literal LIKE prefix.
/// Ordinal filenames contain `_`, so skipping this would over-match.
fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl SqliteStore {
    /// Open (creating if needed) a database file.
    pub async fn open(path: &str) -> Result<Self> {
        let url = format!("sqlite:{path}?mode=rwc");
        let pool = SqlitePool::connect(&url).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database, mostly for tests. A `:memory:` database lives
    /// and dies with its connection, so the pool is pinned to exactly one
    /// connection that is never recycled.
    pub async fn memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the schema. Statements are split on `;` and executed one by
    /// one; sqlx does not run multi-statement scripts in a single call.
    async fn migrate(&self) -> Result<()> {
        let sql = include_str!("../migrations/sqlite.sql");
        for statement in sql.split(';') {
            let statement: String = statement
                .lines()
                .filter(|line| {
                    let trimmed = line.trim();
                    !trimmed.is_empty() && !trimmed.starts_with("--")
                })
                .collect::<Vec<_>>()
                .join("\n");
            if statement.trim().is_empty() {
                continue;
            }
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn fetch<'e, E>(
        executor: E,
        scope: &Scope,
        parent: &str,
        name: &str,
    ) -> Result<Option<NodeRow>>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM nodes \
             WHERE root_key = ?1 AND parent_path = ?2 AND filename = ?3"
        );
        let row = sqlx::query_as::<_, NodeRow>(&sql)
            .bind(&scope.root_key)
            .bind(parent)
            .bind(name)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    /// Fetch a node the scope may read, or `NotFound`.
    async fn require_visible(&self, scope: &Scope, parent: &str, name: &str) -> Result<NodeRow> {
        let full = join_path(parent, name);
        match Self::fetch(&self.pool, scope, parent, name).await? {
            Some(row) if row.visible_to(scope) => Ok(row),
            _ => Err(TreeError::NotFound(full)),
        }
    }

    /// Fetch a node the scope may mutate: `NotFound` when absent or
    /// invisible, `AccessDenied` when visible but owned by someone else.
    async fn require_owned(&self, scope: &Scope, parent: &str, name: &str) -> Result<NodeRow> {
        let row = self.require_visible(scope, parent, name).await?;
        if row.owned_by(scope) {
            Ok(row)
        } else {
            Err(TreeError::AccessDenied(join_path(parent, name)))
        }
    }

    /// Parent directory must exist (the root always does).
    async fn require_parent_dir(&self, scope: &Scope, parent: &str) -> Result<()> {
        if parent.is_empty() {
            return Ok(());
        }
        let (gp, pname) = match parent.rfind('/') {
            Some(idx) => (&parent[..idx], &parent[idx + 1..]),
            None => ("", parent),
        };
        let row = self.require_visible(scope, gp, pname).await?;
        if !row.is_directory {
            return Err(TreeError::Conflict(format!("not a directory: {parent}")));
        }
        Ok(())
    }

    async fn insert_dir(&self, scope: &Scope, parent: &str, name: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO nodes (owner_id, root_key, parent_path, filename, is_directory, \
             content_type, size_bytes, is_public, created_time, modified_time) \
             VALUES (?1, ?2, ?3, ?4, 1, 'inode/directory', 0, 0, ?5, ?5)",
        )
        .bind(scope.owner_id)
        .bind(&scope.root_key)
        .bind(parent)
        .bind(name)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TreeError::Conflict(join_path(parent, name))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }
}

#[async_trait]
impl TreeStore for SqliteStore {
    async fn exists(&self, scope: &Scope, parent: &str, name: &str) -> Result<bool> {
        Ok(Self::fetch(&self.pool, scope, parent, name)
            .await?
            .is_some_and(|row| row.visible_to(scope)))
    }

    async fn stat(&self, scope: &Scope, parent: &str, name: &str) -> Result<NodeMeta> {
        Ok(self.require_visible(scope, parent, name).await?.meta())
    }

    async fn read_file(&self, scope: &Scope, parent: &str, name: &str) -> Result<Content> {
        let row = self.require_visible(scope, parent, name).await?;
        if row.is_directory {
            return Err(TreeError::InvalidFormat(format!(
                "not a file: {}",
                join_path(parent, name)
            )));
        }
        if row.is_binary {
            Ok(Content::Binary(row.content_blob.unwrap_or_default()))
        } else {
            Ok(Content::Text(row.content_text.unwrap_or_default()))
        }
    }

    async fn write_file(
        &self,
        scope: &Scope,
        parent: &str,
        name: &str,
        data: &[u8],
    ) -> Result<NodeMeta> {
        self.require_parent_dir(scope, parent).await?;

        let existing = Self::fetch(&self.pool, scope, parent, name).await?;
        if let Some(row) = &existing {
            if row.is_directory {
                return Err(TreeError::Conflict(format!(
                    "directory exists at {}",
                    join_path(parent, name)
                )));
            }
            if !row.owned_by(scope) {
                return Err(TreeError::AccessDenied(join_path(parent, name)));
            }
        }

        let is_binary = content::is_binary_name(name);
        let content_type = content::content_type_for(name);
        let size = data.len() as i64;
        let now = Utc::now();

        let (text, blob): (Option<String>, Option<&[u8]>) = if is_binary {
            (None, Some(data))
        } else {
            let text = String::from_utf8(data.to_vec()).map_err(|_| {
                TreeError::InvalidFormat(format!(
                    "text-classified file is not valid UTF-8: {name}"
                ))
            })?;
            (Some(text), None)
        };

        match existing {
            Some(row) => {
                sqlx::query(
                    "UPDATE nodes SET is_binary = ?1, content_text = ?2, content_blob = ?3, \
                     content_type = ?4, size_bytes = ?5, modified_time = ?6 WHERE id = ?7",
                )
                .bind(is_binary)
                .bind(&text)
                .bind(blob)
                .bind(content_type)
                .bind(size)
                .bind(now)
                .bind(row.id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO nodes (owner_id, root_key, parent_path, filename, is_directory, \
                     is_binary, content_text, content_blob, content_type, size_bytes, is_public, \
                     created_time, modified_time) \
                     VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?10)",
                )
                .bind(scope.owner_id)
                .bind(&scope.root_key)
                .bind(parent)
                .bind(name)
                .bind(is_binary)
                .bind(&text)
                .bind(blob)
                .bind(content_type)
                .bind(size)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        TreeError::Conflict(join_path(parent, name))
                    } else {
                        e.into()
                    }
                })?;
            }
        }
        debug!(path = %join_path(parent, name), size, is_binary, "wrote file");

        self.stat(scope, parent, name).await
    }

    async fn mkdir(&self, scope: &Scope, parent: &str, name: &str, recursive: bool) -> Result<()> {
        if !recursive {
            self.require_parent_dir(scope, parent).await?;
            return self.insert_dir(scope, parent, name).await;
        }

        // mkdir -p: walk down from the root, creating what is missing.
        // Concurrent importers may race on the same ancestor, so an
        // already-existing directory is not an error here.
        let full = join_path(parent, name);
        let mut cur_parent = String::new();
        for segment in full.split('/') {
            match Self::fetch(&self.pool, scope, &cur_parent, segment).await? {
                Some(row) if row.is_directory => {}
                Some(_) => {
                    return Err(TreeError::Conflict(format!(
                        "file exists at {}",
                        join_path(&cur_parent, segment)
                    )));
                }
                None => match self.insert_dir(scope, &cur_parent, segment).await {
                    Ok(()) | Err(TreeError::Conflict(_)) => {}
                    Err(e) => return Err(e),
                },
            }
            cur_parent = join_path(&cur_parent, segment);
        }
        Ok(())
    }

    async fn unlink(&self, scope: &Scope, parent: &str, name: &str) -> Result<()> {
        let row = self.require_owned(scope, parent, name).await?;
        if row.is_directory {
            return Err(TreeError::InvalidFormat(format!(
                "not a file: {}",
                join_path(parent, name)
            )));
        }
        sqlx::query("DELETE FROM nodes WHERE id = ?1")
            .bind(row.id)
            .execute(&self.pool)
            .await?;
        debug!(path = %join_path(parent, name), "unlinked file");
        Ok(())
    }

    async fn rmdir(&self, scope: &Scope, parent: &str, name: &str, recursive: bool) -> Result<()> {
        let row = self.require_owned(scope, parent, name).await?;
        if !row.is_directory {
            return Err(TreeError::InvalidFormat(format!(
                "not a directory: {}",
                join_path(parent, name)
            )));
        }
        let full = join_path(parent, name);

        if !recursive {
            let (children,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM nodes WHERE root_key = ?1 AND parent_path = ?2",
            )
            .bind(&scope.root_key)
            .bind(&full)
            .fetch_one(&self.pool)
            .await?;
            if children > 0 {
                return Err(TreeError::NotEmpty(full));
            }
            sqlx::query("DELETE FROM nodes WHERE id = ?1")
                .bind(row.id)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        // One transaction: the directory plus every transitive descendant,
        // matched by the path-prefix predicate rather than discovery loops.
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query(
            "DELETE FROM nodes WHERE root_key = ?1 AND owner_id = ?2 \
             AND (parent_path = ?3 OR parent_path LIKE ?4 ESCAPE '\\')",
        )
        .bind(&scope.root_key)
        .bind(scope.owner_id)
        .bind(&full)
        .bind(format!("{}/%", like_escape(&full)))
        .execute(&mut *tx)
        .await?
        .rows_affected();
        sqlx::query("DELETE FROM nodes WHERE id = ?1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!(path = %full, descendants = removed, "removed directory tree");
        Ok(())
    }

    async fn rename(
        &self,
        scope: &Scope,
        old_parent: &str,
        old_name: &str,
        new_parent: &str,
        new_name: &str,
    ) -> Result<()> {
        if old_parent == new_parent && old_name == new_name {
            return Ok(());
        }
        let row = self.require_owned(scope, old_parent, old_name).await?;
        let old_full = join_path(old_parent, old_name);
        if row.is_directory
            && (new_parent == old_full || new_parent.starts_with(&format!("{old_full}/")))
        {
            return Err(TreeError::InvalidFormat(format!(
                "cannot move {old_full} into its own subtree: {new_parent}"
            )));
        }
        if new_parent != old_parent {
            self.require_parent_dir(scope, new_parent).await?;
        }

        let mut tx = self.pool.begin().await?;
        if Self::fetch(&mut *tx, scope, new_parent, new_name)
            .await?
            .is_some()
        {
            return Err(TreeError::Conflict(join_path(new_parent, new_name)));
        }

        sqlx::query(
            "UPDATE nodes SET parent_path = ?1, filename = ?2, modified_time = ?3 WHERE id = ?4",
        )
        .bind(new_parent)
        .bind(new_name)
        .bind(Utc::now())
        .bind(row.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TreeError::Conflict(join_path(new_parent, new_name))
            } else {
                e.into()
            }
        })?;

        if row.is_directory {
            // Bulk descendant-path rewrite: substitute the new prefix in one
            // statement so the tree is never observable half-moved.
            // Descendant timestamps are left as they are. The prefix length
            // is computed in SQL: substr and length both count characters,
            // a Rust byte length would misalign on non-ASCII path segments.
            let new_full = join_path(new_parent, new_name);
            let rewritten = sqlx::query(
                "UPDATE nodes SET parent_path = ?1 || substr(parent_path, length(?4) + 1) \
                 WHERE root_key = ?2 AND owner_id = ?3 \
                 AND (parent_path = ?4 OR parent_path LIKE ?5 ESCAPE '\\')",
            )
            .bind(&new_full)
            .bind(&scope.root_key)
            .bind(scope.owner_id)
            .bind(&old_full)
            .bind(format!("{}/%", like_escape(&old_full)))
            .execute(&mut *tx)
            .await?
            .rows_affected();
            debug!(from = %old_full, to = %new_full, descendants = rewritten, "moved directory");
        }
        tx.commit().await?;
        Ok(())
    }

    async fn readdir(&self, scope: &Scope, parent: &str) -> Result<Vec<NodeMeta>> {
        if !parent.is_empty() {
            let (gp, pname) = match parent.rfind('/') {
                Some(idx) => (&parent[..idx], &parent[idx + 1..]),
                None => ("", parent),
            };
            let row = self.require_visible(scope, gp, pname).await?;
            if !row.is_directory {
                return Err(TreeError::InvalidFormat(format!("not a directory: {parent}")));
            }
        }
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM nodes \
             WHERE root_key = ?1 AND parent_path = ?2 AND (owner_id = ?3 OR is_public = 1)"
        );
        let rows = sqlx::query_as::<_, NodeRow>(&sql)
            .bind(&scope.root_key)
            .bind(parent)
            .bind(scope.owner_id)
            .fetch_all(&self.pool)
            .await?;
        let mut entries: Vec<NodeMeta> = rows.iter().map(NodeRow::meta).collect();
        sort_listing(&mut entries);
        Ok(entries)
    }

    async fn set_public(
        &self,
        scope: &Scope,
        parent: &str,
        name: &str,
        value: bool,
        recursive: bool,
    ) -> Result<()> {
        let row = self.require_owned(scope, parent, name).await?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE nodes SET is_public = ?1, modified_time = ?2 WHERE id = ?3")
            .bind(value)
            .bind(now)
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        if recursive && row.is_directory {
            let full = join_path(parent, name);
            sqlx::query(
                "UPDATE nodes SET is_public = ?1, modified_time = ?2 \
                 WHERE root_key = ?3 AND owner_id = ?4 \
                 AND (parent_path = ?5 OR parent_path LIKE ?6 ESCAPE '\\')",
            )
            .bind(value)
            .bind(now)
            .bind(&scope.root_key)
            .bind(scope.owner_id)
            .bind(&full)
            .bind(format!("{}/%", like_escape(&full)))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(path = %join_path(parent, name), value, recursive, "visibility updated");
        Ok(())
    }
}
