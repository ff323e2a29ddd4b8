//! Local filesystem primitives shared by the tracker and the rollback
//! executor. All functions operate on already-absolute paths.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::FileMetadata;

/// SHA-256 of a file's content, hex-encoded.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Snapshot size, permission bits and mtime for the operation record.
pub fn capture_metadata(path: &Path) -> Result<FileMetadata> {
    let meta = std::fs::metadata(path)?;
    let modified_at = meta
        .modified()
        .ok()
        .map(DateTime::<Utc>::from);
    Ok(FileMetadata {
        size: Some(meta.len()),
        mode: permission_bits(&meta),
        modified_at,
        extra: Default::default(),
    })
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode())
}

#[cfg(not(unix))]
fn permission_bits(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}

/// Check if two paths are on the same filesystem.
#[cfg(unix)]
fn same_filesystem(src: &Path, dst: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;
    let src_meta = std::fs::metadata(src)?;
    let dst_parent = dst.parent().unwrap_or_else(|| Path::new("."));
    let dst_parent_meta = std::fs::metadata(dst_parent)?;
    Ok(src_meta.dev() == dst_parent_meta.dev())
}

#[cfg(not(unix))]
fn same_filesystem(_src: &Path, _dst: &Path) -> Result<bool> {
    // volume_serial_number is unstable; fall back to copy+delete which is
    // safe but slower.
    Ok(false)
}

/// Move a file or directory. Uses an atomic rename on the same filesystem,
/// copy+delete across devices.
pub fn mv(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if same_filesystem(src, dst)? {
        std::fs::rename(src, dst)?;
    } else {
        let metadata = std::fs::metadata(src)?;
        cp(src, dst)?;
        if metadata.is_dir() {
            std::fs::remove_dir_all(src)?;
        } else {
            std::fs::remove_file(src)?;
        }
    }
    Ok(())
}

/// Copy a file, or a directory tree recursively.
pub fn cp(src: &Path, dst: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(src)?;
    if metadata.is_dir() {
        if !dst.exists() {
            std::fs::create_dir_all(dst)?;
        }
        let mut bytes = 0;
        for entry in walkdir::WalkDir::new(src) {
            let entry = entry.map_err(std::io::Error::from)?;
            let rel = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            let target = dst.join(rel);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else {
                bytes += std::fs::copy(entry.path(), &target)?;
            }
        }
        Ok(bytes)
    } else {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::copy(src, dst)?)
    }
}

/// Remove a file or an entire directory tree.
pub fn remove_any(path: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Restore the recorded modification time after a reversal so the file looks
/// the way it did before the original operation.
pub fn restore_mtime(path: &Path, recorded: Option<DateTime<Utc>>) -> Result<()> {
    if let Some(mtime) = recorded {
        let ft = filetime::FileTime::from_unix_time(mtime.timestamp(), mtime.timestamp_subsec_nanos());
        filetime::set_file_mtime(path, ft)?;
    }
    Ok(())
}

/// Build a unique sibling name inside `dir` for `original`'s file name.
pub fn unique_entry_name(dir: &Path, original: &Path) -> PathBuf {
    let name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    dir.join(format!("{}-{}", uuid::Uuid::new_v4(), name))
}
