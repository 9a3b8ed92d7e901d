//! Local-disk backend
//!
//! Passthrough implementation of [`TreeStore`] over a real directory, used
//! by single-tenant deployments that want plain files on disk instead of a
//! database. Each `root_key` maps to a subdirectory of the configured base.
//! Ownership and the public flag have no representation on plain files:
//! reads ignore `owner_id` and `set_public` is `Unsupported`.

use crate::content;
use crate::error::{Result, TreeError};
use crate::node::{Content, NodeKind, NodeMeta, Scope};
use crate::path::join_path;
use crate::store::{TreeStore, sort_listing};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem-backed store rooted at a base directory.
pub struct LocalStore {
    base: PathBuf,
}

impl LocalStore {
    /// Open a store over `base`, creating it if needed.
    pub async fn open(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        tokio::fs::create_dir_all(&base).await?;
        Ok(Self { base })
    }

    fn disk_path(&self, scope: &Scope, parent: &str, name: &str) -> PathBuf {
        let mut path = self.base.join(&scope.root_key);
        if !parent.is_empty() {
            path.push(parent);
        }
        if !name.is_empty() {
            path.push(name);
        }
        path
    }

    async fn metadata_to_meta(path: &Path, parent: &str, name: &str) -> Result<NodeMeta> {
        let md = tokio::fs::metadata(path)
            .await
            .map_err(|_| TreeError::NotFound(join_path(parent, name)))?;
        let modified: DateTime<Utc> = md.modified()?.into();
        let created: DateTime<Utc> = md.created().map(Into::into).unwrap_or(modified);
        let is_dir = md.is_dir();
        Ok(NodeMeta {
            id: 0,
            parent_path: parent.to_string(),
            filename: name.to_string(),
            kind: if is_dir {
                NodeKind::Directory
            } else {
                NodeKind::File
            },
            is_binary: !is_dir && content::is_binary_name(name),
            content_type: if is_dir {
                "inode/directory".to_string()
            } else {
                content::content_type_for(name).to_string()
            },
            size_bytes: if is_dir { 0 } else { md.len() as i64 },
            is_public: false,
            created_time: created,
            modified_time: modified,
        })
    }
}

#[async_trait]
impl TreeStore for LocalStore {
    async fn exists(&self, scope: &Scope, parent: &str, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.disk_path(scope, parent, name)).await?)
    }

    async fn stat(&self, scope: &Scope, parent: &str, name: &str) -> Result<NodeMeta> {
        let path = self.disk_path(scope, parent, name);
        Self::metadata_to_meta(&path, parent, name).await
    }

    async fn read_file(&self, scope: &Scope, parent: &str, name: &str) -> Result<Content> {
        let path = self.disk_path(scope, parent, name);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| TreeError::NotFound(join_path(parent, name)))?;
        if content::is_binary_name(name) {
            Ok(Content::Binary(bytes))
        } else {
            let text = String::from_utf8(bytes).map_err(|_| {
                TreeError::InvalidFormat(format!("text-classified file is not valid UTF-8: {name}"))
            })?;
            Ok(Content::Text(text))
        }
    }

    async fn write_file(
        &self,
        scope: &Scope,
        parent: &str,
        name: &str,
        data: &[u8],
    ) -> Result<NodeMeta> {
        let dir = self.disk_path(scope, parent, "");
        if !tokio::fs::try_exists(&dir).await? {
            return Err(TreeError::NotFound(parent.to_string()));
        }
        let path = self.disk_path(scope, parent, name);
        tokio::fs::write(&path, data).await?;
        debug!(path = %path.display(), size = data.len(), "wrote file");
        Self::metadata_to_meta(&path, parent, name).await
    }

    async fn mkdir(&self, scope: &Scope, parent: &str, name: &str, recursive: bool) -> Result<()> {
        let path = self.disk_path(scope, parent, name);
        if recursive {
            tokio::fs::create_dir_all(&path).await?;
            return Ok(());
        }
        tokio::fs::create_dir(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                TreeError::Conflict(join_path(parent, name))
            } else if e.kind() == std::io::ErrorKind::NotFound {
                TreeError::NotFound(parent.to_string())
            } else {
                e.into()
            }
        })
    }

    async fn unlink(&self, scope: &Scope, parent: &str, name: &str) -> Result<()> {
        let path = self.disk_path(scope, parent, name);
        tokio::fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TreeError::NotFound(join_path(parent, name))
            } else {
                e.into()
            }
        })
    }

    async fn rmdir(&self, scope: &Scope, parent: &str, name: &str, recursive: bool) -> Result<()> {
        let path = self.disk_path(scope, parent, name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(TreeError::NotFound(join_path(parent, name)));
        }
        if recursive {
            tokio::fs::remove_dir_all(&path).await?;
            return Ok(());
        }
        tokio::fs::remove_dir(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::DirectoryNotEmpty {
                TreeError::NotEmpty(join_path(parent, name))
            } else {
                e.into()
            }
        })
    }

    async fn rename(
        &self,
        scope: &Scope,
        old_parent: &str,
        old_name: &str,
        new_parent: &str,
        new_name: &str,
    ) -> Result<()> {
        let from = self.disk_path(scope, old_parent, old_name);
        let to = self.disk_path(scope, new_parent, new_name);
        if !tokio::fs::try_exists(&from).await? {
            return Err(TreeError::NotFound(join_path(old_parent, old_name)));
        }
        if tokio::fs::try_exists(&to).await? {
            return Err(TreeError::Conflict(join_path(new_parent, new_name)));
        }
        // fs::rename moves the whole subtree; descendant paths follow the
        // directory for free here.
        tokio::fs::rename(&from, &to).await?;
        Ok(())
    }

    async fn readdir(&self, scope: &Scope, parent: &str) -> Result<Vec<NodeMeta>> {
        let dir = self.disk_path(scope, parent, "");
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|_| TreeError::NotFound(parent.to_string()))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = Self::metadata_to_meta(&entry.path(), parent, &name).await?;
            entries.push(meta);
        }
        sort_listing(&mut entries);
        Ok(entries)
    }

    async fn set_public(
        &self,
        _scope: &Scope,
        parent: &str,
        name: &str,
        _value: bool,
        _recursive: bool,
    ) -> Result<()> {
        Err(TreeError::Unsupported(format!(
            "visibility flags are not representable on local files: {}",
            join_path(parent, name)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::new(1, "main")
    }

    async fn store() -> (tempfile::TempDir, LocalStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open(tmp.path()).await.unwrap();
        store.mkdir(&scope(), "", "", true).await.unwrap(); // root_key dir
        (tmp, store)
    }

    #[tokio::test]
    async fn round_trip_and_listing() {
        let (_tmp, store) = store().await;
        let s = scope();
        store.write_file(&s, "", "0002_b.md", b"two").await.unwrap();
        store.write_file(&s, "", "0001_a.md", b"one").await.unwrap();

        assert_eq!(
            store.read_file(&s, "", "0001_a.md").await.unwrap(),
            Content::Text("one".into())
        );
        let names: Vec<String> = store
            .readdir(&s, "")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.filename)
            .collect();
        assert_eq!(names, vec!["0001_a.md", "0002_b.md"]);
    }

    #[tokio::test]
    async fn rename_moves_subtree() {
        let (_tmp, store) = store().await;
        let s = scope();
        store.mkdir(&s, "", "d", false).await.unwrap();
        store.write_file(&s, "d", "x.md", b"x").await.unwrap();
        store.rename(&s, "", "d", "", "d2").await.unwrap();
        assert!(store.exists(&s, "d2", "x.md").await.unwrap());
        assert!(!store.exists(&s, "", "d").await.unwrap());
    }

    #[tokio::test]
    async fn set_public_is_unsupported() {
        let (_tmp, store) = store().await;
        assert!(matches!(
            store.set_public(&scope(), "", "x", true, false).await,
            Err(TreeError::Unsupported(_))
        ));
    }
}
