//! Batch scoring of already-compressed files
//!
//! Walks one or more output directories, pairs every video with its source
//! in a reference directory and appends `FileSpec / <Metric>-Value / Bitrate`
//! rows to a results table. Files whose `FileSpec` is already in the table
//! are skipped, so an interrupted analysis resumes where it stopped.

use crate::vmaf::CandidateScorer;
use anyhow::Result;
use shared_utils::batch::{collect_files, SUPPORTED_VIDEO_EXTENSIONS};
use shared_utils::results_table::{file_spec_for, normalize_file_spec, ResultRow, ResultsTable};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

/// Output directory names used by the batch encode scripts
pub const DEFAULT_COMPRESSED_DIRS: &[&str] = &[
    "QSV_Compressed",
    "NVENC_Compressed",
    "NVENC_QP_Compressed",
    "MAC_Compressed",
];

/// Encoder tags appended to a source stem: `<stem><tag><digits>`
const ENCODER_TAGS: &[&str] = &["_intel_q", "_nvidia_qmax", "_nvidia_qp", "_mac_qv"];

const REFERENCE_EXTENSIONS: &[&str] = &["mp4", "MP4", "mov", "MOV"];

/// One compressed file paired with its source
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeJob {
    pub compressed: PathBuf,
    pub reference: PathBuf,
    pub file_spec: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzeSummary {
    pub found: usize,
    pub already_recorded: usize,
    pub unmatched: usize,
    pub scored: usize,
    pub unscored: usize,
    pub written: usize,
}

/// Source stem for a compressed stem. `clip_nvidia_qp30_aq` -> `clip`;
/// a stem with no encoder tag is its own source stem.
pub fn reference_stem(stem: &str) -> &str {
    let stem = stem.strip_suffix("_aq").unwrap_or(stem);
    ENCODER_TAGS
        .iter()
        .find_map(|tag| {
            let idx = stem.rfind(tag)?;
            let digits = &stem[idx + tag.len()..];
            let numbered = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
            (numbered && idx > 0).then(|| &stem[..idx])
        })
        .unwrap_or(stem)
}

/// First existing `<ref_dir>/<source stem>.{mp4,MP4,mov,MOV}`
pub fn match_reference(ref_dir: &Path, compressed: &Path) -> Option<PathBuf> {
    let stem = compressed.file_stem()?.to_str()?;
    let base = reference_stem(stem);
    REFERENCE_EXTENSIONS
        .iter()
        .map(|ext| ref_dir.join(format!("{}.{}", base, ext)))
        .find(|p| p.is_file())
}

/// Pair every video under `comp_dirs` with its source, dropping files that
/// are already recorded or have no source
pub fn plan_jobs(
    ref_dir: &Path,
    comp_dirs: &[PathBuf],
    recorded: &HashSet<String>,
    summary: &mut AnalyzeSummary,
) -> Vec<AnalyzeJob> {
    let mut jobs = Vec::new();
    for dir in comp_dirs {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "Compressed directory not found, skipping");
            continue;
        }
        for compressed in collect_files(dir, SUPPORTED_VIDEO_EXTENSIONS, true) {
            summary.found += 1;
            if compressed.to_str().is_none() {
                warn!(path = %compressed.display(), "Skipping non-UTF-8 path");
                summary.unmatched += 1;
                continue;
            }
            let file_spec = file_spec_for(&compressed);
            if recorded.contains(&normalize_file_spec(&file_spec)) {
                debug!(file_spec = %file_spec, "Already recorded");
                summary.already_recorded += 1;
                continue;
            }
            match match_reference(ref_dir, &compressed) {
                Some(reference) => jobs.push(AnalyzeJob {
                    compressed,
                    reference,
                    file_spec,
                }),
                None => {
                    warn!(file = %compressed.display(), "No matching reference");
                    summary.unmatched += 1;
                }
            }
        }
    }
    jobs
}

/// Bitrate first, then score; a file missing either produces no row
fn score_job(scorer: &dyn CandidateScorer, job: &AnalyzeJob) -> Option<ResultRow> {
    let Some(bitrate) = scorer.bitrate(&job.compressed) else {
        warn!(file_spec = %job.file_spec, "Bitrate unknown, skipping");
        return None;
    };
    let Some(score) = scorer.score(&job.reference, &job.compressed) else {
        warn!(file_spec = %job.file_spec, "Score unavailable, skipping");
        return None;
    };
    info!(file_spec = %job.file_spec, score, bitrate, "Scored");
    Some(ResultRow {
        file_spec: job.file_spec.clone(),
        score,
        bitrate,
    })
}

/// Score `jobs` on `workers` threads. Rows come back ordered by `FileSpec`.
pub fn score_jobs(scorer: &dyn CandidateScorer, jobs: &[AnalyzeJob], workers: usize) -> Vec<ResultRow> {
    let next = AtomicUsize::new(0);
    let rows = Mutex::new(Vec::with_capacity(jobs.len()));

    thread::scope(|s| {
        for _ in 0..workers.clamp(1, jobs.len().max(1)) {
            s.spawn(|| loop {
                let idx = next.fetch_add(1, Ordering::SeqCst);
                let Some(job) = jobs.get(idx) else {
                    break;
                };
                if let Some(row) = score_job(scorer, job) {
                    rows.lock().unwrap_or_else(PoisonError::into_inner).push(row);
                }
            });
        }
    });

    let mut rows = rows.into_inner().unwrap_or_else(PoisonError::into_inner);
    rows.sort_by(|a, b| a.file_spec.cmp(&b.file_spec));
    rows
}

/// Score everything under `comp_dirs` not yet in `table` and append the rows
pub fn analyze_directories(
    scorer: &dyn CandidateScorer,
    ref_dir: &Path,
    comp_dirs: &[PathBuf],
    table: &ResultsTable,
    workers: usize,
) -> Result<AnalyzeSummary> {
    let recorded = table.existing_file_specs()?;
    let mut summary = AnalyzeSummary::default();
    let jobs = plan_jobs(ref_dir, comp_dirs, &recorded, &mut summary);
    info!(
        found = summary.found,
        recorded = summary.already_recorded,
        pending = jobs.len(),
        "Analysis planned"
    );

    let rows = score_jobs(scorer, &jobs, workers);
    summary.scored = rows.len();
    summary.unscored = jobs.len() - rows.len();
    summary.written = table.append_new(&rows)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Score is the compressed file's length / 100; bitrate its length
    struct SizeScorer {
        no_bitrate_for: Option<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl SizeScorer {
        fn new() -> Self {
            Self {
                no_bitrate_for: None,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl CandidateScorer for SizeScorer {
        fn score(&self, reference: &Path, candidate: &Path) -> Option<f64> {
            assert!(reference.is_file());
            self.calls
                .lock()
                .unwrap()
                .push(candidate.file_name().unwrap().to_string_lossy().to_string());
            Some(fs::metadata(candidate).ok()?.len() as f64 / 100.0)
        }

        fn bitrate(&self, path: &Path) -> Option<f64> {
            let name = path.file_name()?.to_str()?;
            if Some(name) == self.no_bitrate_for {
                return None;
            }
            Some(fs::metadata(path).ok()?.len() as f64)
        }
    }

    fn touch(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; len]).unwrap();
    }

    #[test]
    fn test_reference_stem() {
        assert_eq!(reference_stem("clip_intel_q21"), "clip");
        assert_eq!(reference_stem("clip_nvidia_qmax28"), "clip");
        assert_eq!(reference_stem("clip_nvidia_qp30_aq"), "clip");
        assert_eq!(reference_stem("my_clip_mac_qv60"), "my_clip");
        assert_eq!(reference_stem("clip"), "clip");
        assert_eq!(reference_stem("clip_intel_q"), "clip_intel_q");
        assert_eq!(reference_stem("clip_intel_qx1"), "clip_intel_qx1");
    }

    #[test]
    fn test_match_reference_tries_each_extension() {
        let dir = TempDir::new().unwrap();
        let refs = dir.path().join("Videos");
        touch(&refs.join("trip.MOV"), 10);

        let found = match_reference(&refs, Path::new("NVENC_Compressed/trip_nvidia_qp24.mp4"));
        assert_eq!(found, Some(refs.join("trip.MOV")));
        assert_eq!(match_reference(&refs, Path::new("x/other_intel_q20.mp4")), None);
    }

    #[test]
    fn test_analyze_resumes_without_duplicate_rows() {
        let dir = TempDir::new().unwrap();
        let refs = dir.path().join("Videos");
        let qsv = dir.path().join("QSV_Compressed");
        let mac = dir.path().join("MAC_Compressed");
        touch(&refs.join("a.mp4"), 10_000);
        touch(&refs.join("b.mov"), 10_000);
        touch(&qsv.join("a_intel_q21.mp4"), 9000);
        touch(&mac.join("b_mac_qv60.mp4"), 8000);
        touch(&mac.join("orphan_mac_qv60.mp4"), 8000);

        let table = ResultsTable::new(dir.path().join("Results/FFMetrics.Results.csv"), "VMAF");
        let comp_dirs = vec![qsv.clone(), mac.clone(), dir.path().join("missing")];

        let scorer = SizeScorer::new();
        let first = analyze_directories(&scorer, &refs, &comp_dirs, &table, 2).unwrap();
        assert_eq!(first.found, 3);
        assert_eq!(first.unmatched, 1);
        assert_eq!(first.written, 2);

        touch(&qsv.join("a_intel_q23.mp4"), 7000);
        let scorer = SizeScorer::new();
        let second = analyze_directories(&scorer, &refs, &comp_dirs, &table, 2).unwrap();
        assert_eq!(second.already_recorded, 2);
        assert_eq!(second.written, 1);
        assert_eq!(*scorer.calls.lock().unwrap(), vec!["a_intel_q23.mp4".to_string()]);

        let content = fs::read_to_string(table.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "FileSpec\tVMAF-Value\tBitrate",
                "MAC_Compressed/b_mac_qv60.mp4\t80.0000\t8000.00",
                "QSV_Compressed/a_intel_q21.mp4\t90.0000\t9000.00",
                "QSV_Compressed/a_intel_q23.mp4\t70.0000\t7000.00",
            ]
        );
    }

    #[test]
    fn test_unknown_bitrate_skips_scoring() {
        let dir = TempDir::new().unwrap();
        let refs = dir.path().join("Videos");
        let out = dir.path().join("NVENC_Compressed");
        touch(&refs.join("a.mp4"), 10_000);
        touch(&out.join("a_nvidia_qmax28.mp4"), 5000);

        let mut scorer = SizeScorer::new();
        scorer.no_bitrate_for = Some("a_nvidia_qmax28.mp4");
        let table = ResultsTable::new(dir.path().join("r.csv"), "VMAF");
        let summary = analyze_directories(&scorer, &refs, &[out], &table, 1).unwrap();

        assert_eq!(summary.unscored, 1);
        assert_eq!(summary.written, 0);
        assert!(scorer.calls.lock().unwrap().is_empty());
        assert!(!table.path().exists());
    }

    #[test]
    fn test_score_jobs_uses_every_job_once() {
        let dir = TempDir::new().unwrap();
        let reference = dir.path().join("ref.mp4");
        touch(&reference, 100);
        let jobs: Vec<AnalyzeJob> = (0..12)
            .map(|i| {
                let compressed = dir.path().join("out").join(format!("c{:02}.mp4", i));
                touch(&compressed, 100 + i);
                AnalyzeJob {
                    file_spec: file_spec_for(&compressed),
                    compressed,
                    reference: reference.clone(),
                }
            })
            .collect();

        let scorer = SizeScorer::new();
        let rows = score_jobs(&scorer, &jobs, 4);
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].file_spec, "out/c00.mp4");
        assert_eq!(rows[11].file_spec, "out/c11.mp4");
        assert_eq!(scorer.calls.lock().unwrap().len(), 12);
    }
}
