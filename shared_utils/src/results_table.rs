//! Tab-separated result table
//!
//! Format shared with the plotting tools:
//!
//! ```text
//! FileSpec	VMAF-Value	Bitrate
//! Compressed/clip.mp4	95.1234	4500.00
//! ```
//!
//! Rows are appended across runs; the header is written only when the file
//! is new or empty. `FileSpec` is `<parent dir>/<file name>`, and a spec
//! already in the table is never written twice.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub file_spec: String,
    pub score: f64,
    /// kbps
    pub bitrate: f64,
}

impl ResultRow {
    fn to_line(&self) -> String {
        format!("{}\t{:.4}\t{:.2}", self.file_spec, self.score, self.bitrate)
    }
}

/// `FileSpec` key for a scored file: `<parent dir>/<file name>`
pub fn file_spec_for(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match path
        .parent()
        .and_then(|p| p.file_name())
        .map(|d| d.to_string_lossy())
    {
        Some(dir) => format!("{}/{}", dir, name),
        None => name,
    }
}

/// Reduce a spec written elsewhere (absolute path, `\` separators) to the
/// `<parent dir>/<file name>` key
pub fn normalize_file_spec(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");
    let parts: Vec<&str> = unified.split('/').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [] => String::new(),
        [name] => name.to_string(),
        [.., dir, name] => format!("{}/{}", dir, name),
    }
}

#[derive(Debug, Clone)]
pub struct ResultsTable {
    path: PathBuf,
    metric: String,
}

impl ResultsTable {
    pub fn new(path: impl Into<PathBuf>, metric: &str) -> Self {
        Self {
            path: path.into(),
            metric: metric.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> String {
        format!("FileSpec\t{}-Value\tBitrate", self.metric)
    }

    /// Normalized `FileSpec`s already recorded; empty when the table is missing
    pub fn existing_file_specs(&self) -> Result<HashSet<String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read result table {}", self.path.display()))
            }
        };

        let mut lines = content.lines().peekable();
        let mut spec_column = 0;
        if let Some(first) = lines.peek() {
            let cols: Vec<&str> = first.split('\t').collect();
            if let Some(idx) = cols.iter().position(|c| c.trim() == "FileSpec") {
                spec_column = idx;
                lines.next();
            }
        }

        Ok(lines
            .filter_map(|line| line.split('\t').nth(spec_column))
            .map(normalize_file_spec)
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// Append only rows whose `FileSpec` is not in the table yet. Returns the
    /// number written.
    pub fn append_new(&self, rows: &[ResultRow]) -> Result<usize> {
        let mut seen = self.existing_file_specs()?;
        let fresh: Vec<ResultRow> = rows
            .iter()
            .filter(|r| {
                let inserted = seen.insert(normalize_file_spec(&r.file_spec));
                if !inserted {
                    tracing::debug!(file_spec = %r.file_spec, "Already in result table");
                }
                inserted
            })
            .cloned()
            .collect();
        self.append(&fresh)?;
        Ok(fresh.len())
    }

    /// Append rows, writing the header first if the table is new
    pub fn append(&self, rows: &[ResultRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open result table {}", self.path.display()))?;

        let mut buf = String::new();
        if needs_header {
            buf.push_str(&self.header());
            buf.push('\n');
        }
        for row in rows {
            buf.push_str(&row.to_line());
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())
            .with_context(|| format!("Failed to write result table {}", self.path.display()))?;

        tracing::info!(
            path = %self.path.display(),
            rows = rows.len(),
            "Result table updated"
        );
        Ok(())
    }
}
