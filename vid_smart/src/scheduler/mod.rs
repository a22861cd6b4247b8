//! Adaptive quality search scheduler
//!
//! Each video walks its encoder's quality parameter from one step worse than
//! the default toward better quality until a candidate both fits the size
//! budget and reaches the target score:
//!
//! ```text
//! PendingEncode ──encode ok, ratio ≤ limit──▶ PendingScore
//!      ▲   │                                      │
//!      │   ├─ out of range ──▶ Exhausted           ├─ score ≥ target ──▶ Accepted
//!      │   └─ ratio > limit ─▶ RejectedSize        ├─ no score ────────▶ ScoreFailed
//!      └──────── below target: promote to best effort, step ◀┘
//! ```
//!
//! Two worker pools (encode, score) pull from two bounded channels. A task
//! that needs another round is put back on the encode channel; channel
//! capacity equals the batch size so this never blocks.

mod config;
mod finalize;
mod shared_state;
mod summary;
mod task;


pub use config::{SchedulerConfig, SizeBreachPolicy};
pub use finalize::cleanup_task_temporaries;
pub use shared_state::SharedState;
pub use summary::{print_summary, result_rows, summary_headers, summary_rows};
pub use task::{PendingCandidate, ScoredCandidate, SearchOutcome, TaskResult, TaskState, VideoTask};

use crate::compressor::CandidateEncoder;
use crate::vmaf::CandidateScorer;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use shared_utils::file_ops::{file_size, remove_if_exists, replace_with, size_ratio};
use shared_utils::results_table::ResultsTable;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

// ═══════════════════════════════════════════════════════════════
// Pipeline plumbing
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Encode,
    Score,
}

impl Stage {
    fn label(self) -> &'static str {
        match self {
            Stage::Encode => "encode",
            Stage::Score => "score",
        }
    }
}

/// Where a task goes after one processing step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    ToEncode,
    ToScore,
    Finalize(TaskState),
}

type Queue = Arc<Mutex<Receiver<VideoTask>>>;

/// Everything a worker needs, borrowed for the lifetime of one batch
struct Pipeline<'a> {
    encoder: &'a dyn CandidateEncoder,
    scorer: &'a dyn CandidateScorer,
    config: &'a SchedulerConfig,
    shared: SharedState,
    encode_tx: SyncSender<VideoTask>,
    score_tx: SyncSender<VideoTask>,
    shutdown: &'a AtomicBool,
    halt: AtomicBool,
    progress: ProgressBar,
}

impl Pipeline<'_> {
    fn stopping(&self) -> bool {
        self.halt.load(Ordering::SeqCst) || self.shutdown.load(Ordering::SeqCst)
    }

    fn worker_loop(&self, stage: Stage, queue: &Queue) {
        debug!(stage = stage.label(), "Worker started");
        loop {
            let next = {
                let rx = queue.lock().unwrap_or_else(PoisonError::into_inner);
                if self.stopping() {
                    break;
                }
                rx.recv_timeout(self.config.poll_interval)
            };
            match next {
                Ok(task) if self.stopping() => {
                    // leave it for the drain; no new step starts after shutdown
                    debug!(task = %task.name(), stage = stage.label(), "Returning task to queue");
                    self.enqueue(self.sender(stage), task);
                    break;
                }
                Ok(task) => self.handle(stage, task),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(stage = stage.label(), "Worker stopped");
    }

    fn sender(&self, stage: Stage) -> &SyncSender<VideoTask> {
        match stage {
            Stage::Encode => &self.encode_tx,
            Stage::Score => &self.score_tx,
        }
    }

    /// Run one step, catching errors and panics so only this task fails
    fn handle(&self, stage: Stage, mut task: VideoTask) {
        let step = panic::catch_unwind(AssertUnwindSafe(|| match stage {
            Stage::Encode => self.process_encode(&mut task),
            Stage::Score => self.process_score(&mut task),
        }));

        let transition = match step {
            Ok(Ok(t)) => t,
            Ok(Err(e)) => {
                error!(
                    task = %task.name(),
                    stage = stage.label(),
                    error = %format!("{:#}", e),
                    "Task step failed"
                );
                Transition::Finalize(TaskState::Failed)
            }
            Err(payload) => {
                error!(
                    task = %task.name(),
                    stage = stage.label(),
                    panic = %panic_message(payload.as_ref()),
                    "Task step panicked"
                );
                Transition::Finalize(TaskState::Failed)
            }
        };

        match transition {
            Transition::ToEncode => {
                task.state = TaskState::PendingEncode;
                self.enqueue(&self.encode_tx, task);
            }
            Transition::ToScore => {
                task.state = TaskState::PendingScore;
                self.enqueue(&self.score_tx, task);
            }
            Transition::Finalize(state) => self.finalize(task, state),
        }
    }

    fn enqueue(&self, tx: &SyncSender<VideoTask>, task: VideoTask) {
        match tx.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(task)) | Err(TrySendError::Disconnected(task)) => {
                error!(task = %task.name(), "Queue unavailable, finalizing task");
                self.finalize(task, TaskState::Failed);
            }
        }
    }

    fn finalize(&self, mut task: VideoTask, state: TaskState) {
        if let Some(result) = task.finalize(state, self.config.size_breach_policy) {
            self.progress.set_message(result.name());
            self.shared.finish(result);
            self.progress.inc(1);
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // State handlers
    // ═══════════════════════════════════════════════════════════════

    fn process_encode(&self, task: &mut VideoTask) -> Result<Transition> {
        let profile = self.encoder.profile();
        let (min, max) = profile.quality_range();
        let step = profile.quality_step();
        let quality = task.current_quality;

        if quality < min || quality > max {
            info!(task = %task.name(), quality, "Quality range exhausted");
            return Ok(Transition::Finalize(TaskState::Exhausted));
        }

        if !profile.is_valid_quality(quality) {
            debug!(task = %task.name(), quality, "Skipping duplicate quality value");
            task.advance(step);
            return Ok(Transition::ToEncode);
        }

        let temp = task.temp_path(quality);
        task.attempts.push(quality);
        info!(task = %task.name(), quality, "Encoding");

        let size = if self.encoder.encode(&task.input_path, &temp, quality) {
            file_size(&temp)
        } else {
            None
        };
        let Some(size) = size else {
            warn!(task = %task.name(), quality, "Encode failed, trying next value");
            remove_if_exists(&temp)?;
            task.advance(step);
            return Ok(Transition::ToEncode);
        };

        let ratio = size_ratio(size, task.source_size);
        if ratio > self.config.size_limit {
            info!(
                task = %task.name(),
                quality,
                ratio,
                limit = self.config.size_limit,
                "Candidate exceeds size limit"
            );
            remove_if_exists(&temp)?;
            return Ok(Transition::Finalize(TaskState::RejectedSize));
        }

        task.candidate = Some(PendingCandidate {
            path: temp,
            quality,
            ratio,
        });
        Ok(Transition::ToScore)
    }

    fn process_score(&self, task: &mut VideoTask) -> Result<Transition> {
        let Some(candidate) = task.candidate.take() else {
            anyhow::bail!("score stage reached without a candidate");
        };

        let Some(score) = self.scorer.score(&task.input_path, &candidate.path) else {
            warn!(task = %task.name(), quality = candidate.quality, "Quality score unavailable");
            remove_if_exists(&candidate.path)?;
            return Ok(Transition::Finalize(TaskState::ScoreFailed));
        };

        info!(
            task = %task.name(),
            quality = candidate.quality,
            score,
            ratio = candidate.ratio,
            target = self.config.target_score,
            "Candidate scored"
        );

        if score >= self.config.target_score {
            replace_with(&candidate.path, &task.output_path)?;
            task.accepted = Some(ScoredCandidate {
                path: task.output_path.clone(),
                quality: candidate.quality,
                score,
                ratio: candidate.ratio,
            });
            if let Some(previous) = task.best_effort.take() {
                // finalization sweeps it again
                if let Err(e) = remove_if_exists(&previous.path) {
                    warn!(path = %previous.path.display(), error = %e, "Could not remove superseded best effort");
                }
            }
            return Ok(Transition::Finalize(TaskState::Accepted));
        }

        let best_path = task.best_effort_path();
        replace_with(&candidate.path, &best_path)?;
        task.best_effort = Some(ScoredCandidate {
            path: best_path,
            quality: candidate.quality,
            score,
            ratio: candidate.ratio,
        });
        task.advance(self.encoder.profile().quality_step());
        Ok(Transition::ToEncode)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn drain(queue: &Queue) -> Vec<VideoTask> {
    let rx = queue.lock().unwrap_or_else(PoisonError::into_inner);
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn batch_progress(total: usize, visible: bool) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    if !visible {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return pb;
    }
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {pos}/{len} • {elapsed_precise} • {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░");
    pb.set_style(style);
    pb.set_prefix("Compressing");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ═══════════════════════════════════════════════════════════════
// SmartScheduler
// ═══════════════════════════════════════════════════════════════

pub struct SmartScheduler {
    encoder: Arc<dyn CandidateEncoder>,
    scorer: Arc<dyn CandidateScorer>,
    config: SchedulerConfig,
    shutdown: Arc<AtomicBool>,
}

impl SmartScheduler {
    pub fn new(
        encoder: Arc<dyn CandidateEncoder>,
        scorer: Arc<dyn CandidateScorer>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            encoder,
            scorer,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned interrupt flag (e.g. a Ctrl-C handler's)
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Setting this flag stops the batch; queued tasks are force-finalized
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Build tasks for (input, output) pairs and run them. Missing inputs are
    /// reported and skipped.
    pub fn run(&self, pairs: Vec<(PathBuf, PathBuf)>) -> Vec<TaskResult> {
        let profile = self.encoder.profile();
        let tasks: Vec<VideoTask> = pairs
            .into_iter()
            .filter_map(|(input, output)| match VideoTask::new(input, output, profile) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(error = %e, "Skipping input");
                    None
                }
            })
            .collect();
        self.run_tasks(tasks)
    }

    /// Run prepared tasks to completion (or interruption). Results are sorted
    /// by input path.
    pub fn run_tasks(&self, tasks: Vec<VideoTask>) -> Vec<TaskResult> {
        if tasks.is_empty() {
            info!("No tasks to process");
            return Vec::new();
        }

        let total = tasks.len();
        let (encode_tx, encode_rx) = mpsc::sync_channel(total);
        let (score_tx, score_rx) = mpsc::sync_channel(total);
        let encode_queue: Queue = Arc::new(Mutex::new(encode_rx));
        let score_queue: Queue = Arc::new(Mutex::new(score_rx));

        let pipeline = Pipeline {
            encoder: self.encoder.as_ref(),
            scorer: self.scorer.as_ref(),
            config: &self.config,
            shared: SharedState::new(),
            encode_tx,
            score_tx,
            shutdown: self.shutdown.as_ref(),
            halt: AtomicBool::new(false),
            progress: batch_progress(total, self.config.show_progress),
        };

        for task in tasks {
            pipeline.shared.register();
            pipeline.enqueue(&pipeline.encode_tx, task);
        }

        info!(
            tasks = total,
            encoder = self.encoder.profile().name(),
            encode_workers = self.config.encode_workers,
            score_workers = self.config.score_workers,
            target = self.config.target_score,
            size_limit = self.config.size_limit,
            "Starting batch"
        );

        thread::scope(|s| {
            let mut started = [0usize; 2];
            for (idx, stage, count, queue) in [
                (0, Stage::Encode, self.config.encode_workers, &encode_queue),
                (1, Stage::Score, self.config.score_workers, &score_queue),
            ] {
                for n in 0..count.max(1) {
                    let pipeline = &pipeline;
                    let spawned = thread::Builder::new()
                        .name(format!("{}-{}", stage.label(), n))
                        .spawn_scoped(s, move || pipeline.worker_loop(stage, queue));
                    match spawned {
                        Ok(_) => started[idx] += 1,
                        Err(e) => error!(stage = stage.label(), error = %e, "Failed to spawn worker"),
                    }
                }
            }
            if started.contains(&0) {
                error!("A pipeline stage has no workers, aborting batch");
                pipeline.halt.store(true, Ordering::SeqCst);
            }

            while !pipeline.stopping() && pipeline.shared.active() > 0 {
                thread::sleep(self.config.poll_interval);
            }
            if self.shutdown.load(Ordering::SeqCst) {
                warn!("Shutdown requested, finishing in-flight steps");
            }
            pipeline.halt.store(true, Ordering::SeqCst);
        });

        let leftovers: Vec<VideoTask> = drain(&encode_queue)
            .into_iter()
            .chain(drain(&score_queue))
            .collect();
        if !leftovers.is_empty() {
            info!(count = leftovers.len(), "Force-finalizing queued tasks");
        }
        for task in leftovers {
            pipeline.finalize(task, TaskState::Interrupted);
        }

        pipeline.progress.finish_and_clear();
        let mut results = pipeline.shared.take_results();
        results.sort_by(|a, b| a.input_path.cmp(&b.input_path));

        if let Err(e) = self.record_results(&results) {
            error!(error = %format!("{:#}", e), "Could not write results table");
        }
        results
    }

    /// Append scored outputs not yet in the configured results table
    pub fn record_results(&self, results: &[TaskResult]) -> Result<usize> {
        let Some(path) = &self.config.results_table else {
            return Ok(0);
        };
        let rows = result_rows(results, |r| self.scorer.bitrate(&r.output_path));
        let written = ResultsTable::new(path, &self.config.metric_name).append_new(&rows)?;
        debug!(path = %path.display(), rows = written, "Results table updated");
        Ok(written)
    }
}
