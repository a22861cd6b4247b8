//! vid-smart - VMAF-targeted adaptive HEVC compression
//!
//! For each video, steps a hardware encoder's quality parameter from one
//! notch worse than its calibrated default toward better quality, keeping
//! the first candidate that reaches the target VMAF without exceeding the
//! size budget. Falls back to the best size-compliant candidate, or to a
//! verbatim copy of the source.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vid_smart::{get_encoder, Compressor, SchedulerConfig, SmartScheduler, VmafScorer};
//!
//! let profile = get_encoder("nvidia")?;
//! let scheduler = SmartScheduler::new(
//!     Arc::new(Compressor::new(profile)),
//!     Arc::new(VmafScorer::new()),
//!     SchedulerConfig::default(),
//! );
//! let results = scheduler.run(vec![(input, output)]);
//! ```

pub mod analyze;
pub mod compressor;
pub mod encode_permit;
pub mod encoders;
pub mod scheduler;
pub mod vmaf;

pub use analyze::{analyze_directories, match_reference, AnalyzeSummary};
pub use compressor::{CandidateEncoder, Compressor};
pub use encode_permit::EncodePermit;
pub use encoders::{get_encoder, EncoderProfile, AVAILABLE_ENCODERS};
pub use scheduler::{
    print_summary, SchedulerConfig, SearchOutcome, SizeBreachPolicy, SmartScheduler, TaskResult,
    TaskState, VideoTask,
};
pub use vmaf::{check_vmaf_support, CandidateScorer, VmafScorer};

pub use shared_utils::errors::{Result, SmartError};
