//! Archive importer
//!
//! Unpacks a zip or gzip-compressed tar upload into a target directory of
//! the tree. Entry paths are sanitized outright (defense in depth on top of
//! the facade's containment check), directories materialize through
//! recursive mkdir and files through the normal write path, so text/binary
//! classification applies as usual. Every directory that received an entry
//! is renumbered alphabetically afterwards.
//!
//! Entries whose destination already exists are overwritten; `write_file`'s
//! upsert makes that the natural policy.

use crate::error::{Result, TreeError};
use crate::node::{BatchOutcome, Scope};
use crate::path::{TreePath, join_path};
use crate::shift::renumber_alphabetical;
use crate::store::TreeStore;
use flate2::read::GzDecoder;
use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use tar::EntryType;
use tracing::{info, warn};
use zip::ZipArchive;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from the uploaded filename.
    pub fn from_name(filename: &str) -> Result<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Ok(ArchiveFormat::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Ok(ArchiveFormat::TarGz)
        } else {
            Err(TreeError::Unsupported(format!(
                "archive format not supported: {filename}"
            )))
        }
    }
}

struct ArchiveEntry {
    /// Path relative to the target directory, normalized.
    rel_path: String,
    is_dir: bool,
    data: Vec<u8>,
}

/// Import an archive into `target_dir` (which must already exist).
///
/// Per-entry failures are recorded in the outcome and do not abort the rest
/// of the archive. File entries are written concurrently and fully drained
/// before the final renumber pass, which would otherwise race against
/// in-flight writes.
pub async fn import_archive(
    store: &dyn TreeStore,
    scope: &Scope,
    target_dir: &str,
    format: ArchiveFormat,
    data: &[u8],
) -> Result<BatchOutcome> {
    if !target_dir.is_empty() {
        let target = TreePath::parse(target_dir)?;
        let (parent, name) = target.split();
        let meta = store.stat(scope, parent.as_str(), name).await?;
        if !meta.is_directory() {
            return Err(TreeError::InvalidFormat(format!(
                "import target is not a directory: {target_dir}"
            )));
        }
    }

    let mut outcome = BatchOutcome::default();
    let entries = match format {
        ArchiveFormat::Zip => read_zip(data, &mut outcome)?,
        ArchiveFormat::TarGz => read_tar_gz(data, &mut outcome)?,
    };

    // Directories first, sequentially: file entries may arrive before their
    // directory entry (tar orders are not guaranteed), and concurrent file
    // writes below lean on mkdir -p being idempotent either way.
    let mut touched: BTreeSet<String> = BTreeSet::new();
    touched.insert(target_dir.to_string());
    for entry in entries.iter().filter(|e| e.is_dir) {
        let dest = TreePath::parse(&join_path(target_dir, &entry.rel_path))?;
        let (parent, name) = dest.split();
        match store.mkdir(scope, parent.as_str(), name, true).await {
            Ok(()) => {
                touched.insert(parent.as_str().to_string());
                outcome.record_ok();
            }
            Err(e) => {
                warn!(entry = %entry.rel_path, %e, "import: mkdir failed");
                outcome.record_err(format!("{}: {e}", entry.rel_path));
            }
        }
    }

    // File entries run concurrently; join_all drains every task before the
    // renumber pass starts.
    let file_entries: Vec<&ArchiveEntry> = entries.iter().filter(|e| !e.is_dir).collect();
    let results = futures::future::join_all(file_entries.iter().map(|entry| async move {
        let dest = TreePath::parse(&join_path(target_dir, &entry.rel_path))?;
        let (parent, name) = dest.split();
        if !parent.is_root() && parent.as_str() != target_dir {
            let (pp, pn) = parent.split();
            store.mkdir(scope, pp.as_str(), pn, true).await?;
        }
        store.write_file(scope, parent.as_str(), name, &entry.data).await?;
        Ok::<String, TreeError>(parent.as_str().to_string())
    }))
    .await;

    for (entry, result) in file_entries.iter().zip(results) {
        match result {
            Ok(parent) => {
                touched.insert(parent);
                outcome.record_ok();
            }
            Err(e) => {
                warn!(entry = %entry.rel_path, %e, "import: write failed");
                outcome.record_err(format!("{}: {e}", entry.rel_path));
            }
        }
    }

    // Renumber deepest directories first: renaming a child directory during
    // its parent's pass would leave deeper recorded paths stale.
    let mut dirs: Vec<String> = touched.into_iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count() + 1));
    for dir in dirs {
        renumber_alphabetical(store, scope, &dir).await?;
    }

    info!(
        dir = target_dir,
        succeeded = outcome.succeeded,
        total = outcome.total,
        "archive imported"
    );
    Ok(outcome)
}

/// Reject absolute entry paths and any `..` segment, normalize the rest.
fn sanitize_entry_path(raw: &str) -> Result<String> {
    let trimmed = raw.trim_matches('/');
    if raw.starts_with('/') || raw.starts_with('\\') {
        return Err(TreeError::InvalidFormat(format!(
            "absolute archive entry path: {raw}"
        )));
    }
    if trimmed.split(['/', '\\']).any(|seg| seg == "..") {
        return Err(TreeError::InvalidFormat(format!(
            "archive entry escapes the target: {raw}"
        )));
    }
    let path = TreePath::parse(trimmed)?;
    if path.is_root() {
        return Err(TreeError::InvalidFormat(format!(
            "empty archive entry path: {raw}"
        )));
    }
    Ok(path.as_str().to_string())
}

fn read_zip(data: &[u8], outcome: &mut BatchOutcome) -> Result<Vec<ArchiveEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let raw_name = file.name().to_string();
        let rel_path = match sanitize_entry_path(&raw_name) {
            Ok(p) => p,
            Err(e) => {
                warn!(entry = %raw_name, %e, "import: rejected zip entry");
                outcome.record_err(format!("{raw_name}: {e}"));
                continue;
            }
        };
        if file.is_dir() {
            entries.push(ArchiveEntry {
                rel_path,
                is_dir: true,
                data: Vec::new(),
            });
        } else {
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf)
                .map_err(|e| TreeError::Archive(e.to_string()))?;
            entries.push(ArchiveEntry {
                rel_path,
                is_dir: false,
                data: buf,
            });
        }
    }
    Ok(entries)
}

fn read_tar_gz(data: &[u8], outcome: &mut BatchOutcome) -> Result<Vec<ArchiveEntry>> {
    let mut archive = tar::Archive::new(GzDecoder::new(data));
    let mut entries = Vec::new();
    for entry in archive
        .entries()
        .map_err(|e| TreeError::Archive(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| TreeError::Archive(e.to_string()))?;
        let kind = entry.header().entry_type();
        if !matches!(kind, EntryType::Regular | EntryType::Directory) {
            continue;
        }
        let raw_name = entry
            .path()
            .map_err(|e| TreeError::Archive(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        let rel_path = match sanitize_entry_path(&raw_name) {
            Ok(p) => p,
            Err(e) => {
                warn!(entry = %raw_name, %e, "import: rejected tar entry");
                outcome.record_err(format!("{raw_name}: {e}"));
                continue;
            }
        };
        if kind == EntryType::Directory {
            entries.push(ArchiveEntry {
                rel_path,
                is_dir: true,
                data: Vec::new(),
            });
        } else {
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut buf)
                .map_err(|e| TreeError::Archive(e.to_string()))?;
            entries.push(ArchiveEntry {
                rel_path,
                is_dir: false,
                data: buf,
            });
        }
    }
    Ok(entries)
}
