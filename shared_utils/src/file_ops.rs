//! File operations used at finalization time
//!
//! - 输出永远是 delete-then-move：先删除已有目标，再 rename，绝不合并
//! - 原样复制（回退到原视频）保留修改时间
//! - 复制先写入同目录的 `.partial` 文件再 rename，中途失败不会留下半个输出

use anyhow::{Context, Result};
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File size in bytes, `None` when the file is missing
pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
}

/// Candidate size over source size. A zero-byte source yields 1.0.
pub fn size_ratio(candidate_size: u64, source_size: u64) -> f64 {
    if source_size == 0 {
        1.0
    } else {
        candidate_size as f64 / source_size as f64
    }
}

/// Remove a file if present. Returns whether something was deleted.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn partial_path(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dst.with_file_name(format!(".{}.partial", name))
}

/// Move `artifact` to `dst`, deleting any pre-existing `dst` first
pub fn replace_with(artifact: &Path, dst: &Path) -> Result<()> {
    ensure_parent_dir(dst)?;
    remove_if_exists(dst).with_context(|| format!("Failed to remove {}", dst.display()))?;
    fs::rename(artifact, dst).with_context(|| {
        format!(
            "Failed to move {} -> {}",
            artifact.display(),
            dst.display()
        )
    })?;
    Ok(())
}

/// Copy `src` to `dst` byte for byte, preserving the modification time
pub fn copy_verbatim(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent_dir(dst)?;
    let partial = partial_path(dst);

    fs::copy(src, &partial).with_context(|| {
        format!("Failed to copy {} -> {}", src.display(), partial.display())
    })?;

    let metadata = fs::metadata(src).with_context(|| format!("Failed to stat {}", src.display()))?;
    let mtime = FileTime::from_last_modification_time(&metadata);
    if let Err(e) = filetime::set_file_mtime(&partial, mtime) {
        tracing::debug!(path = %partial.display(), error = %e, "Could not preserve mtime");
    }

    if let Err(e) = replace_with(&partial, dst) {
        let _ = remove_if_exists(&partial);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_size_ratio() {
        assert_eq!(size_ratio(50, 100), 0.5);
        assert_eq!(size_ratio(8000, 10000), 0.8);
        assert_eq!(size_ratio(10, 0), 1.0);
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp4");
        assert!(!remove_if_exists(&path).unwrap());
        fs::write(&path, b"x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_copy_verbatim_creates_dirs_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.mp4");
        let dst = dir.path().join("nested/out/dst.mp4");
        fs::write(&src, b"original bytes").unwrap();

        copy_verbatim(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"original bytes");

        fs::write(&dst, b"stale output that is longer than the source").unwrap();
        copy_verbatim(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"original bytes");
        assert!(!partial_path(&dst).exists());
    }

    #[test]
    fn test_copy_verbatim_preserves_mtime() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.mp4");
        let dst = dir.path().join("dst.mp4");
        fs::write(&src, b"data").unwrap();
        let old = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src, old).unwrap();

        copy_verbatim(&src, &dst).unwrap();
        let meta = fs::metadata(&dst).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn test_replace_with_moves_artifact() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("a_best_effort.mp4");
        let dst = dir.path().join("a.mp4");
        fs::write(&artifact, b"candidate").unwrap();
        fs::write(&dst, b"old").unwrap();

        replace_with(&artifact, &dst).unwrap();
        assert!(!artifact.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"candidate");
    }

    #[test]
    fn test_file_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        assert_eq!(file_size(&path), None);
        fs::write(&path, vec![0u8; 123]).unwrap();
        assert_eq!(file_size(&path), Some(123));
        assert_eq!(file_size(dir.path()), None);
    }
}
