//! Per-video search state
//!
//! A `VideoTask` is owned by exactly one place at a time: a queue, a worker,
//! or finalization. Temporaries live next to the output:
//! `{stem}_temp_q{quality}{ext}` for the candidate under test and
//! `{stem}_best_effort{ext}` for the best size-compliant result so far.

use crate::encoders::EncoderProfile;
use shared_utils::file_ops::file_size;
use shared_utils::SmartError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    PendingEncode,
    PendingScore,
    /// Scored at or above target; the candidate became the output
    Accepted,
    /// Candidate exceeded the size limit
    RejectedSize,
    /// Quality parameter left the valid range
    Exhausted,
    /// Scorer returned no value
    ScoreFailed,
    /// Unexpected error or panic while processing
    Failed,
    /// Drained after a shutdown request
    Interrupted,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::PendingEncode | TaskState::PendingScore)
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskState::PendingEncode => "pending-encode",
            TaskState::PendingScore => "pending-score",
            TaskState::Accepted => "accepted",
            TaskState::RejectedSize => "rejected-size",
            TaskState::Exhausted => "exhausted",
            TaskState::ScoreFailed => "score-failed",
            TaskState::Failed => "failed",
            TaskState::Interrupted => "interrupted",
        }
    }
}

/// What ended up at the output path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    MetTarget,
    BestEffort,
    FallbackToSource,
}

/// A candidate that passed the size check and was scored
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub path: PathBuf,
    pub quality: i32,
    pub score: f64,
    pub ratio: f64,
}

/// Encoded, size-checked, waiting for a score
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCandidate {
    pub path: PathBuf,
    pub quality: i32,
    pub ratio: f64,
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub final_state: TaskState,
    pub outcome: SearchOutcome,
    /// Quality, score and ratio of the file at `output_path`; `None` for a source copy
    pub quality: Option<i32>,
    pub score: Option<f64>,
    pub ratio: Option<f64>,
    /// Every quality value actually encoded, in order
    pub attempts: Vec<i32>,
    pub error: Option<String>,
}

impl TaskResult {
    pub fn name(&self) -> String {
        display_name(&self.input_path)
    }
}

#[derive(Debug)]
pub struct VideoTask {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub current_quality: i32,
    pub source_size: u64,
    pub state: TaskState,
    pub candidate: Option<PendingCandidate>,
    pub best_effort: Option<ScoredCandidate>,
    pub accepted: Option<ScoredCandidate>,
    pub attempts: Vec<i32>,
    pub(crate) finalized: bool,
}

impl VideoTask {
    /// Starts one step worse than the profile default. Paths must be UTF-8
    /// since they end up in ffmpeg argument lists.
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        profile: &dyn EncoderProfile,
    ) -> Result<Self, SmartError> {
        let input_path = input_path.into();
        let output_path = output_path.into();
        for path in [&input_path, &output_path] {
            if path.to_str().is_none() {
                return Err(SmartError::NonUtf8Path(path.clone()));
            }
        }
        let source_size =
            file_size(&input_path).ok_or_else(|| SmartError::InputMissing(input_path.clone()))?;
        Ok(Self {
            input_path,
            output_path,
            current_quality: profile.start_quality(),
            source_size,
            state: TaskState::PendingEncode,
            candidate: None,
            best_effort: None,
            accepted: None,
            attempts: Vec::new(),
            finalized: false,
        })
    }

    pub fn name(&self) -> String {
        display_name(&self.input_path)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn advance(&mut self, step: i32) {
        self.current_quality += step;
    }

    pub fn temp_path(&self, quality: i32) -> PathBuf {
        let (stem, ext) = stem_and_ext(&self.output_path);
        self.sibling(format!("{}_temp_q{}{}", stem, quality, ext))
    }

    pub fn best_effort_path(&self) -> PathBuf {
        let (stem, ext) = stem_and_ext(&self.output_path);
        self.sibling(format!("{}_best_effort{}", stem, ext))
    }

    fn sibling(&self, name: String) -> PathBuf {
        self.output_path.with_file_name(name)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// (`clip`, `.mp4`); extension keeps its dot, empty when absent
pub(crate) fn stem_and_ext(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::{IntelEncoder, MacEncoder};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_new_task_starts_one_step_worse() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mp4");
        fs::write(&input, vec![0u8; 123]).unwrap();

        let task = VideoTask::new(&input, dir.path().join("out/clip.mp4"), &IntelEncoder).unwrap();
        assert_eq!(task.current_quality, 26);
        assert_eq!(task.source_size, 123);
        assert_eq!(task.state, TaskState::PendingEncode);

        let mac = VideoTask::new(&input, dir.path().join("clip.mp4"), &MacEncoder::default()).unwrap();
        assert_eq!(mac.current_quality, 57);
    }

    #[test]
    fn test_missing_input_rejected() {
        let err = VideoTask::new("/nonexistent/x.mp4", "/tmp/x.mp4", &IntelEncoder).unwrap_err();
        assert!(matches!(err, SmartError::InputMissing(_)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_input_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let input = dir.path().join(OsStr::from_bytes(b"clip\xff.mp4"));
        fs::write(&input, b"x").unwrap();

        let err = VideoTask::new(&input, dir.path().join("out.mp4"), &IntelEncoder).unwrap_err();
        assert!(matches!(err, SmartError::NonUtf8Path(p) if p == input));

        let ok_input = dir.path().join("clip.mp4");
        fs::write(&ok_input, b"x").unwrap();
        let err = VideoTask::new(&ok_input, &input, &IntelEncoder).unwrap_err();
        assert!(matches!(err, SmartError::NonUtf8Path(_)));
    }

    #[test]
    fn test_temp_names() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mov");
        fs::write(&input, b"x").unwrap();
        let task = VideoTask::new(&input, "/out/trip/clip.mov", &IntelEncoder).unwrap();
        assert_eq!(task.temp_path(25), PathBuf::from("/out/trip/clip_temp_q25.mov"));
        assert_eq!(task.best_effort_path(), PathBuf::from("/out/trip/clip_best_effort.mov"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::PendingEncode.is_terminal());
        assert!(!TaskState::PendingScore.is_terminal());
        for s in [
            TaskState::Accepted,
            TaskState::RejectedSize,
            TaskState::Exhausted,
            TaskState::ScoreFailed,
            TaskState::Failed,
            TaskState::Interrupted,
        ] {
            assert!(s.is_terminal(), "{}", s.label());
        }
    }
}
