//! Batch Processing Module
//!
//! Collects input videos and maps each one to its mirrored output path.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const SUPPORTED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "m4v"];

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Files under `dir` with one of `extensions`, sorted by path
pub fn collect_files(dir: &Path, extensions: &[&str], recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(true)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_extension(e.path(), extensions))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// `output_root/<file relative to input_root>`
pub fn mirror_output_path(input_root: &Path, file: &Path, output_root: &Path) -> PathBuf {
    match file.strip_prefix(input_root) {
        Ok(rel) => output_root.join(rel),
        Err(_) => output_root.join(file.file_name().unwrap_or_default()),
    }
}

/// (input, output) pairs for a directory, skipping anything already inside
/// `output_root` when it is nested in `input_root`
pub fn collect_task_pairs(
    input_root: &Path,
    output_root: &Path,
    recursive: bool,
) -> Vec<(PathBuf, PathBuf)> {
    collect_files(input_root, SUPPORTED_VIDEO_EXTENSIONS, recursive)
        .into_iter()
        .filter(|f| !f.starts_with(output_root))
        .map(|f| {
            let out = mirror_output_path(input_root, &f, output_root);
            (f, out)
        })
        .collect()
}
