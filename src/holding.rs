//! Holding area for soft-deleted files.
//!
//! Nothing this engine touches is ever hard-deleted directly: a Delete stashes
//! the file here under a unique name, and undo restores it from here. Entries
//! older than the retention window are purged by cleanup and become
//! permanently unrecoverable.

use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::fsops;

#[derive(Debug, Clone)]
pub struct HoldingArea {
    root: PathBuf,
    retention: Duration,
}

impl HoldingArea {
    pub fn open(root: PathBuf, retention_days: u32) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            retention: Duration::days(i64::from(retention_days)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Move `path` into the holding area, returning the stash location.
    ///
    /// The entry's mtime is reset to the stash time: the move preserves the
    /// file's own mtime, which may predate the retention window and would
    /// make the entry purgeable immediately. Undo restores the recorded
    /// mtime, so nothing is lost by overwriting it here.
    pub fn stash(&self, path: &Path) -> Result<PathBuf> {
        let target = fsops::unique_entry_name(&self.root, path);
        fsops::mv(path, &target)?;
        filetime::set_file_mtime(&target, filetime::FileTime::now())?;
        debug!(src = %path.display(), stash = %target.display(), "stashed file in holding area");
        Ok(target)
    }

    /// Move a stashed entry back to its original location.
    pub fn restore(&self, stash: &Path, original: &Path) -> Result<()> {
        fsops::mv(stash, original)?;
        debug!(stash = %stash.display(), dst = %original.display(), "restored file from holding area");
        Ok(())
    }

    /// Whether an entry recorded at `recorded_at` is still within retention.
    pub fn within_retention(&self, recorded_at: DateTime<Utc>) -> bool {
        Utc::now() - recorded_at <= self.retention
    }

    /// Remove entries stashed before the retention cutoff (`stash` keys the
    /// entry mtime to stash time). Returns (entries removed, bytes reclaimed).
    pub fn purge_expired(&self) -> Result<(usize, u64)> {
        let cutoff = Utc::now() - self.retention;
        let mut removed = 0;
        let mut bytes = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            let mtime: DateTime<Utc> = match meta.modified() {
                Ok(t) => t.into(),
                Err(_) => continue,
            };
            if mtime < cutoff {
                bytes += entry_size(&entry.path())?;
                fsops::remove_any(&entry.path())?;
                removed += 1;
            }
        }
        Ok((removed, bytes))
    }
}

fn entry_size(path: &Path) -> Result<u64> {
    let meta = std::fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    let mut total = 0;
    for entry in walkdir::WalkDir::new(path) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(std::io::Error::from)?.len();
        }
    }
    Ok(total)
}
