//! Batch summary and result-table rows

use super::task::{SearchOutcome, TaskResult};
use shared_utils::report::print_table;
use shared_utils::results_table::{file_spec_for, ResultRow};

const UNAVAILABLE: &str = "unavailable";

pub fn summary_headers(metric: &str) -> Vec<String> {
    vec![
        "File".to_string(),
        "Quality".to_string(),
        metric.to_string(),
        "Ratio".to_string(),
        "Result".to_string(),
    ]
}

pub fn summary_rows(results: &[TaskResult]) -> Vec<Vec<String>> {
    results
        .iter()
        .map(|r| {
            vec![
                r.name(),
                r.quality
                    .map(|q| q.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                r.score
                    .map(|s| format!("{:.2}", s))
                    .unwrap_or_else(|| UNAVAILABLE.to_string()),
                r.ratio
                    .map(|x| format!("{:.2}", x))
                    .unwrap_or_else(|| UNAVAILABLE.to_string()),
                outcome_label(r).to_string(),
            ]
        })
        .collect()
}

fn outcome_label(r: &TaskResult) -> &'static str {
    if r.error.is_some() {
        return "error";
    }
    match r.outcome {
        SearchOutcome::MetTarget => "met target",
        SearchOutcome::BestEffort => "best effort",
        SearchOutcome::FallbackToSource => "original",
    }
}

pub fn print_summary(results: &[TaskResult], metric: &str) {
    let headers = summary_headers(metric);
    let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
    print_table("Compression Summary", &headers, &summary_rows(results));

    let met = results
        .iter()
        .filter(|r| r.outcome == SearchOutcome::MetTarget)
        .count();
    let best = results
        .iter()
        .filter(|r| r.outcome == SearchOutcome::BestEffort)
        .count();
    println!(
        "{} files: {} met target, {} best effort, {} kept original",
        results.len(),
        met,
        best,
        results.len() - met - best
    );
}

/// Row for every output that carries a score; `bitrate` looks up kbps
pub fn result_rows(
    results: &[TaskResult],
    mut bitrate: impl FnMut(&TaskResult) -> Option<f64>,
) -> Vec<ResultRow> {
    results
        .iter()
        .filter_map(|r| {
            let score = r.score?;
            let Some(kbps) = bitrate(r) else {
                tracing::warn!(output = %r.output_path.display(), "Bitrate unknown, skipping result row");
                return None;
            };
            Some(ResultRow {
                file_spec: file_spec_for(&r.output_path),
                score,
                bitrate: kbps,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::TaskState;
    use std::path::PathBuf;

    fn result(name: &str, outcome: SearchOutcome, q: Option<i32>, score: Option<f64>) -> TaskResult {
        TaskResult {
            input_path: PathBuf::from(format!("/in/{}", name)),
            output_path: PathBuf::from(format!("/out/{}", name)),
            final_state: TaskState::Accepted,
            outcome,
            quality: q,
            score,
            ratio: score.map(|_| 0.5),
            attempts: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn test_summary_rows_mark_unavailable() {
        let rows = summary_rows(&[
            result("a.mp4", SearchOutcome::MetTarget, Some(21), Some(95.5)),
            result("b.mp4", SearchOutcome::FallbackToSource, None, None),
        ]);
        assert_eq!(rows[0], vec!["a.mp4", "21", "95.50", "0.50", "met target"]);
        assert_eq!(rows[1], vec!["b.mp4", "-", "unavailable", "unavailable", "original"]);
    }

    #[test]
    fn test_result_rows_skip_unscored_and_unknown_bitrate() {
        let results = vec![
            result("a.mp4", SearchOutcome::MetTarget, Some(21), Some(95.5)),
            result("b.mp4", SearchOutcome::FallbackToSource, None, None),
            result("c.mp4", SearchOutcome::BestEffort, Some(19), Some(81.0)),
        ];
        let rows = result_rows(&results, |r| {
            if r.name() == "c.mp4" {
                None
            } else {
                Some(1200.0)
            }
        });
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_spec, "out/a.mp4");
        assert_eq!(rows[0].bitrate, 1200.0);
    }
}
