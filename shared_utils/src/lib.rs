//! Shared Utilities for the vid-smart tools
//!
//! Cross-cutting plumbing used by the adaptive compression scheduler:
//! - Logging setup and external tool logging
//! - FFmpeg process management (stderr draining, score parsing)
//! - FFprobe bitrate / resolution probes
//! - Finalization-safe file operations
//! - Result table (TSV) and summary rendering
//! - Batch input enumeration
//! - Score-stage thread budget

pub mod batch;
pub mod errors;
pub mod ffmpeg_process;
pub mod ffprobe;
pub mod file_ops;
pub mod logging;
pub mod report;
pub mod results_table;
pub mod thread_manager;

pub use batch::{collect_files, collect_task_pairs, mirror_output_path, SUPPORTED_VIDEO_EXTENSIONS};
pub use errors::{Result, SmartError};
pub use ffmpeg_process::{format_ffmpeg_error, parse_metric_score, run_to_completion, FfmpegProcess};
pub use ffprobe::{probe_bitrate_kbps, probe_resolution};
pub use file_ops::{copy_verbatim, file_size, remove_if_exists, replace_with, size_ratio};
pub use report::{print_table, render_table};
pub use results_table::{ResultRow, ResultsTable};
pub use thread_manager::{score_stage_allocation, ThreadAllocation};
