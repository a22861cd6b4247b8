//! Finalization - puts exactly one file at the output path
//!
//! Order matters: the pending candidate is discarded, the output is written
//! (delete-then-move or verbatim copy), then every temporary belonging to
//! the task is removed. A task is finalized at most once.

use super::config::SizeBreachPolicy;
use super::task::{stem_and_ext, SearchOutcome, TaskResult, TaskState, VideoTask};
use anyhow::{Context, Result};
use shared_utils::file_ops::{copy_verbatim, remove_if_exists, replace_with};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

impl VideoTask {
    /// Write the final output for `state`. `None` when already finalized.
    pub fn finalize(&mut self, state: TaskState, policy: SizeBreachPolicy) -> Option<TaskResult> {
        if self.finalized {
            debug!(task = %self.name(), "Already finalized");
            return None;
        }
        self.finalized = true;
        self.state = state;

        if let Some(candidate) = self.candidate.take() {
            if let Err(e) = remove_if_exists(&candidate.path) {
                warn!(path = %candidate.path.display(), error = %e, "Could not remove candidate");
            }
        }

        let (mut outcome, mut quality, mut score, mut ratio) =
            (SearchOutcome::FallbackToSource, None, None, None);

        let written = match state {
            TaskState::Accepted if self.output_path.is_file() => {
                if let Some(acc) = &self.accepted {
                    outcome = SearchOutcome::MetTarget;
                    quality = Some(acc.quality);
                    score = Some(acc.score);
                    ratio = Some(acc.ratio);
                }
                Ok(())
            }
            TaskState::RejectedSize if policy == SizeBreachPolicy::ResetToSource => {
                copy_verbatim(&self.input_path, &self.output_path)
            }
            _ => match self.best_effort.clone().filter(|b| b.path.is_file()) {
                Some(best) => {
                    let moved = replace_with(&best.path, &self.output_path);
                    if moved.is_ok() {
                        outcome = SearchOutcome::BestEffort;
                        quality = Some(best.quality);
                        score = Some(best.score);
                        ratio = Some(best.ratio);
                    }
                    moved.or_else(|e| {
                        warn!(task = %self.name(), error = %e, "Best-effort move failed, using source");
                        copy_verbatim(&self.input_path, &self.output_path)
                    })
                }
                None => copy_verbatim(&self.input_path, &self.output_path),
            },
        };

        let error = written.err().map(|e| {
            error!(task = %self.name(), error = %format!("{:#}", e), "Finalization could not write output");
            format!("{:#}", e)
        });

        self.best_effort = None;
        if let Err(e) = cleanup_task_temporaries(&self.output_path) {
            warn!(task = %self.name(), error = %e, "Temporary cleanup incomplete");
        }

        info!(
            task = %self.name(),
            state = state.label(),
            outcome = ?outcome,
            quality = ?quality,
            score = ?score,
            ratio = ?ratio,
            "Task finalized"
        );

        Some(TaskResult {
            input_path: self.input_path.clone(),
            output_path: self.output_path.clone(),
            final_state: state,
            outcome,
            quality,
            score,
            ratio,
            attempts: self.attempts.clone(),
            error,
        })
    }
}

/// Whether `name` is one of the temporaries derived from `stem` + `ext`
fn is_task_temporary(name: &str, stem: &str, ext: &str) -> bool {
    let Some(body) = name.strip_suffix(ext) else {
        return false;
    };
    if body == format!("{}_best_effort", stem) {
        return true;
    }
    body.strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix("_temp_q"))
        .map(|q| {
            let digits = q.strip_prefix('-').unwrap_or(q);
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        })
        .unwrap_or(false)
}

/// Remove `{stem}_temp_q*{ext}` and `{stem}_best_effort{ext}` beside `output`
pub fn cleanup_task_temporaries(output: &Path) -> Result<Vec<PathBuf>> {
    let Some(dir) = output.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(Vec::new());
    };
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let (stem, ext) = stem_and_ext(output);

    let mut removed = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| is_task_temporary(n, &stem, &ext))
            .unwrap_or(false);
        if matches && remove_if_exists(&path)? {
            debug!(path = %path.display(), "Removed stale temporary");
            removed.push(path);
        }
    }
    Ok(removed)
}
