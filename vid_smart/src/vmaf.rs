//! VMAF quality scorer
//!
//! Scores a candidate against its reference with ffmpeg's `libvmaf` filter.
//! The model follows the reference resolution (4K model at or above
//! 3840x2160), and the `neg` variant is an independent switch.
//! Any probe or scoring failure is `None`, which callers treat as a
//! measurement failure rather than a low score.

use shared_utils::ffmpeg_process::{format_ffmpeg_error, parse_metric_score, run_to_completion};
use shared_utils::ffprobe::{probe_bitrate_kbps, probe_resolution};
use shared_utils::logging::execute_external_command;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

pub const MODEL_STANDARD: &str = "vmaf_v0.6.1";
pub const MODEL_STANDARD_NEG: &str = "vmaf_v0.6.1neg";
pub const MODEL_4K: &str = "vmaf_4k_v0.6.1";
pub const MODEL_4K_NEG: &str = "vmaf_4k_v0.6.1neg";

const UHD_PIXELS: u64 = 3840 * 2160;

/// Score seam used by the scheduler
pub trait CandidateScorer: Send + Sync {
    /// Quality of `candidate` relative to `reference`
    fn score(&self, reference: &Path, candidate: &Path) -> Option<f64>;

    /// Average bitrate in kbps
    fn bitrate(&self, path: &Path) -> Option<f64>;
}

/// Model for a reference resolution; unknown resolution uses the standard model
pub fn model_for_resolution(resolution: Option<(u32, u32)>, use_neg: bool) -> &'static str {
    let is_uhd = resolution
        .map(|(w, h)| u64::from(w) * u64::from(h) >= UHD_PIXELS)
        .unwrap_or(false);
    match (is_uhd, use_neg) {
        (true, true) => MODEL_4K_NEG,
        (true, false) => MODEL_4K,
        (false, true) => MODEL_STANDARD_NEG,
        (false, false) => MODEL_STANDARD,
    }
}

/// Whether `ffmpeg -filters` lists libvmaf
pub fn check_vmaf_support(ffmpeg_bin: &str) -> bool {
    let args = vec!["-hide_banner".to_string(), "-filters".to_string()];
    match execute_external_command(ffmpeg_bin, &args) {
        Ok(result) => result.stdout.contains("libvmaf"),
        Err(e) => {
            warn!(error = %e, "Could not query ffmpeg filters");
            false
        }
    }
}

pub struct VmafScorer {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    n_threads: usize,
    use_neg_model: bool,
    metric: String,
    resolutions: Mutex<HashMap<PathBuf, (u32, u32)>>,
}

impl Default for VmafScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl VmafScorer {
    pub fn new() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            n_threads: 4,
            use_neg_model: false,
            metric: "VMAF".to_string(),
            resolutions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ffmpeg_bin(mut self, bin: impl Into<String>) -> Self {
        self.ffmpeg_bin = bin.into();
        self
    }

    pub fn with_ffprobe_bin(mut self, bin: impl Into<String>) -> Self {
        self.ffprobe_bin = bin.into();
        self
    }

    /// libvmaf `n_threads`
    pub fn with_threads(mut self, n: usize) -> Self {
        self.n_threads = n.max(1);
        self
    }

    pub fn with_neg_model(mut self, enabled: bool) -> Self {
        self.use_neg_model = enabled;
        self
    }

    /// Label looked up in ffmpeg's output (`<metric> score: ...`)
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Width and height, probed once per path
    pub fn resolution(&self, path: &Path) -> Option<(u32, u32)> {
        if let Some(res) = self
            .resolutions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Some(*res);
        }

        // probe outside the lock; a racing duplicate probe is harmless
        let res = probe_resolution(&self.ffprobe_bin, path)?;
        self.resolutions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), res);
        Some(res)
    }

    pub fn select_model(&self, reference: &Path, use_neg: bool) -> &'static str {
        model_for_resolution(self.resolution(reference), use_neg)
    }

    pub fn score_with_model(&self, reference: &Path, candidate: &Path, model: &str) -> Option<f64> {
        let filter = format!(
            "[0:v][1:v]libvmaf=model=version={}:n_threads={}",
            model, self.n_threads
        );
        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.arg("-i")
            .arg(candidate)
            .arg("-i")
            .arg(reference)
            .args(["-lavfi", filter.as_str(), "-f", "null", "-"]);

        let outcome = match run_to_completion(&mut cmd) {
            Ok(o) => o,
            Err(e) => {
                warn!(candidate = %candidate.display(), error = %e, "VMAF process failed to run");
                return None;
            }
        };
        if !outcome.success() {
            warn!(
                candidate = %candidate.display(),
                error = %format_ffmpeg_error(&outcome.stderr),
                "VMAF calculation failed"
            );
            return None;
        }

        let score = parse_metric_score(&outcome.stderr, &self.metric);
        match score {
            Some(s) => debug!(candidate = %candidate.display(), model, score = s, "VMAF scored"),
            None => warn!(candidate = %candidate.display(), "No VMAF score in ffmpeg output"),
        }
        score
    }
}

impl CandidateScorer for VmafScorer {
    fn score(&self, reference: &Path, candidate: &Path) -> Option<f64> {
        let model = self.select_model(reference, self.use_neg_model);
        self.score_with_model(reference, candidate, model)
    }

    fn bitrate(&self, path: &Path) -> Option<f64> {
        probe_bitrate_kbps(&self.ffprobe_bin, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_selection() {
        assert_eq!(model_for_resolution(Some((1920, 1080)), false), MODEL_STANDARD);
        assert_eq!(model_for_resolution(Some((1920, 1080)), true), MODEL_STANDARD_NEG);
        assert_eq!(model_for_resolution(Some((3840, 2160)), false), MODEL_4K);
        assert_eq!(model_for_resolution(Some((4096, 2160)), true), MODEL_4K_NEG);
        assert_eq!(model_for_resolution(None, false), MODEL_STANDARD);
    }

    #[test]
    fn test_threshold_is_pixel_count() {
        // portrait UHD has the same pixel count
        assert_eq!(model_for_resolution(Some((2160, 3840)), false), MODEL_4K);
        assert_eq!(model_for_resolution(Some((3839, 2160)), false), MODEL_STANDARD);
    }

    #[test]
    fn test_missing_tools_are_measurement_failures() {
        let scorer = VmafScorer::new()
            .with_ffmpeg_bin("/nonexistent/ffmpeg")
            .with_ffprobe_bin("/nonexistent/ffprobe");
        let p = Path::new("/nonexistent/a.mp4");
        assert_eq!(scorer.resolution(p), None);
        assert_eq!(scorer.score(p, p), None);
        assert_eq!(scorer.bitrate(p), None);
        assert!(!check_vmaf_support("/nonexistent/ffmpeg"));
    }
}

#[cfg(all(test, unix))]
mod script_tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_tool(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_score_parses_last_line() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = fake_tool(
            &dir,
            "ffmpeg",
            "echo 'VMAF score: 80.1' >&2; echo '[Parsed_libvmaf_0 @ 0x1] VMAF score: 96.25' >&2",
        );
        let scorer = VmafScorer::new()
            .with_ffmpeg_bin(ffmpeg)
            .with_ffprobe_bin("/nonexistent/ffprobe");
        let p = dir.path().join("x.mp4");
        assert_eq!(scorer.score(&p, &p), Some(96.25));
    }

    #[test]
    fn test_failed_run_is_none() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = fake_tool(&dir, "ffmpeg", "echo 'VMAF score: 99' >&2; exit 1");
        let scorer = VmafScorer::new().with_ffmpeg_bin(ffmpeg);
        let p = dir.path().join("x.mp4");
        assert_eq!(scorer.score_with_model(&p, &p, MODEL_STANDARD), None);
    }

    #[test]
    fn test_resolution_cached_and_4k_model() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("calls");
        let body = format!(
            "echo x >> '{}'; echo '{{\"streams\":[{{\"width\":3840,\"height\":2160}}]}}'",
            counter.display()
        );
        let ffprobe = fake_tool(&dir, "ffprobe", &body);
        let scorer = VmafScorer::new().with_ffprobe_bin(ffprobe);
        let p = dir.path().join("uhd.mp4");

        assert_eq!(scorer.select_model(&p, false), MODEL_4K);
        assert_eq!(scorer.select_model(&p, true), MODEL_4K_NEG);
        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_bitrate_falls_back_to_container() {
        let dir = TempDir::new().unwrap();
        let ffprobe = fake_tool(
            &dir,
            "ffprobe",
            r#"case "$*" in *stream=bit_rate*) echo N/A ;; *) echo 2500000 ;; esac"#,
        );
        let scorer = VmafScorer::new().with_ffprobe_bin(ffprobe);
        assert_eq!(scorer.bitrate(&dir.path().join("x.mp4")), Some(2500.0));
    }

    #[test]
    fn test_check_vmaf_support() {
        let dir = TempDir::new().unwrap();
        let yes = fake_tool(&dir, "ff_yes", "echo ' ... libvmaf          VV->V      Calculate the VMAF'");
        let no = fake_tool(&dir, "ff_no", "echo ' ... scale'");
        assert!(check_vmaf_support(&yes));
        assert!(!check_vmaf_support(&no));
    }
}
