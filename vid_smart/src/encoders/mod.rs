//! Encoder profiles - static quality-parameter semantics per hardware backend
//!
//! A profile knows which direction of its quality parameter improves quality
//! (`quality_step`), the valid range, the calibrated default, and how to build
//! the ffmpeg argument list. Profiles are pure: no I/O, never mutated.

mod intel;
mod mac;
mod nvidia;

pub use intel::IntelEncoder;
pub use mac::{MacEncoder, KNOWN_DUPLICATE_QUALITIES};
pub use nvidia::NvidiaEncoder;

use shared_utils::SmartError;
use std::path::Path;
use std::sync::Arc;

pub trait EncoderProfile: Send + Sync {
    /// Backend name (`intel`, `nvidia`, `mac`)
    fn name(&self) -> &str;

    /// FFmpeg codec name, e.g. `hevc_nvenc`
    fn codec_name(&self) -> &str {
        ""
    }

    /// Calibrated default quality value
    fn default_quality(&self) -> i32;

    /// Step that improves quality. Positive: larger is better.
    fn quality_step(&self) -> i32;

    /// Valid (min, max), inclusive
    fn quality_range(&self) -> (i32, i32) {
        (0, 100)
    }

    /// `false` for values known to duplicate a neighbour's output
    fn is_valid_quality(&self, _quality: i32) -> bool {
        true
    }

    /// Full argv, program first
    fn build_command(&self, input: &Path, output: &Path, quality: i32) -> Vec<String>;

    /// Search start: one step worse than the default
    fn start_quality(&self) -> i32 {
        self.default_quality() - self.quality_step()
    }
}

pub const AVAILABLE_ENCODERS: &[&str] = &["intel", "nvidia", "mac"];

pub fn get_encoder(name: &str) -> Result<Arc<dyn EncoderProfile>, SmartError> {
    match name.to_ascii_lowercase().as_str() {
        "intel" => Ok(Arc::new(IntelEncoder)),
        "nvidia" => Ok(Arc::new(NvidiaEncoder)),
        "mac" => Ok(Arc::new(MacEncoder::default())),
        _ => Err(SmartError::UnknownEncoder {
            name: name.to_string(),
            available: AVAILABLE_ENCODERS.join(", "),
        }),
    }
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
