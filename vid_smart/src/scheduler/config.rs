//! Scheduler configuration

use shared_utils::thread_manager::score_stage_allocation;
use std::path::PathBuf;
use std::time::Duration;

/// What to write when a candidate exceeds the size limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeBreachPolicy {
    /// Abandon the search and copy the source verbatim
    #[default]
    ResetToSource,
    /// Keep the best-effort candidate if there is one
    RetreatToBestEffort,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum acceptable score
    pub target_score: f64,
    /// Maximum candidate/source size ratio
    pub size_limit: f64,
    pub encode_workers: usize,
    pub score_workers: usize,
    /// Driving loop and queue poll period
    pub poll_interval: Duration,
    pub size_breach_policy: SizeBreachPolicy,
    /// Append a TSV row per scored output after the batch
    pub results_table: Option<PathBuf>,
    pub metric_name: String,
    pub show_progress: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_score: 95.0,
            size_limit: 0.8,
            encode_workers: 1,
            score_workers: score_stage_allocation(
                shared_utils::thread_manager::DEFAULT_MAX_SCORE_WORKERS,
            )
            .parallel_tasks,
            poll_interval: Duration::from_secs(1),
            size_breach_policy: SizeBreachPolicy::default(),
            results_table: None,
            metric_name: "VMAF".to_string(),
            show_progress: true,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_score(mut self, target: f64) -> Self {
        self.target_score = target;
        self
    }

    pub fn with_size_limit(mut self, limit: f64) -> Self {
        self.size_limit = limit;
        self
    }

    pub fn with_encode_workers(mut self, n: usize) -> Self {
        self.encode_workers = n.max(1);
        self
    }

    pub fn with_score_workers(mut self, n: usize) -> Self {
        self.score_workers = n.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_size_breach_policy(mut self, policy: SizeBreachPolicy) -> Self {
        self.size_breach_policy = policy;
        self
    }

    pub fn with_results_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_table = Some(path.into());
        self
    }

    pub fn with_metric_name(mut self, name: impl Into<String>) -> Self {
        self.metric_name = name.into();
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn validate(&self) -> shared_utils::Result<()> {
        use shared_utils::SmartError;

        if !(self.size_limit > 0.0 && self.size_limit.is_finite()) {
            return Err(SmartError::InvalidConfig(format!(
                "size limit must be a positive ratio, got {}",
                self.size_limit
            )));
        }
        if !self.target_score.is_finite() {
            return Err(SmartError::InvalidConfig(format!(
                "target score must be finite, got {}",
                self.target_score
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(SmartError::InvalidConfig(
                "poll interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
