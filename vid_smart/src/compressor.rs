//! Compression invoker - runs one encode attempt for a profile
//!
//! Success means: zero exit AND an output file on disk. On a non-zero exit
//! any partial output is removed. The optional size guard (one-shot mode)
//! replaces an oversized result with a verbatim copy of the input; the
//! adaptive scheduler never sets it.

use crate::encode_permit::EncodePermit;
use crate::encoders::EncoderProfile;
use anyhow::{Context, Result};
use shared_utils::ffmpeg_process::{format_ffmpeg_error, run_to_completion};
use shared_utils::file_ops::{copy_verbatim, file_size, remove_if_exists, size_ratio};
use shared_utils::logging::log_external_tool;
use shared_utils::SmartError;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Encode seam used by the scheduler
pub trait CandidateEncoder: Send + Sync {
    fn profile(&self) -> &dyn EncoderProfile;

    /// Unguarded encode of `input` at `quality` into `output`
    fn encode(&self, input: &Path, output: &Path, quality: i32) -> bool;
}

pub struct Compressor {
    profile: Arc<dyn EncoderProfile>,
    permit: Option<Arc<EncodePermit>>,
}

impl Compressor {
    pub fn new(profile: Arc<dyn EncoderProfile>) -> Self {
        Self {
            profile,
            permit: None,
        }
    }

    /// Serialize encodes across every compressor sharing `permit`
    pub fn with_permit(mut self, permit: Arc<EncodePermit>) -> Self {
        self.permit = Some(permit);
        self
    }

    pub fn compress_file(
        &self,
        input: &Path,
        output: &Path,
        quality: i32,
        size_guard: Option<f64>,
    ) -> bool {
        match self.try_compress(input, output, quality, size_guard) {
            Ok(ok) => ok,
            Err(e) => {
                warn!(
                    input = %input.display(),
                    quality,
                    error = %format!("{:#}", e),
                    "Compression failed"
                );
                let _ = remove_if_exists(output);
                false
            }
        }
    }

    fn try_compress(
        &self,
        input: &Path,
        output: &Path,
        quality: i32,
        size_guard: Option<f64>,
    ) -> Result<bool> {
        for path in [input, output] {
            if path.to_str().is_none() {
                warn!(path = %path.display(), "Non UTF-8 path");
                return Err(SmartError::NonUtf8Path(path.to_path_buf()).into());
            }
        }

        let Some(input_size) = file_size(input) else {
            warn!(input = %input.display(), "Input file missing");
            return Ok(false);
        };

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let argv = self.profile.build_command(input, output, quality);
        let Some((program, args)) = argv.split_first() else {
            anyhow::bail!("Encoder profile {} built an empty command", self.profile.name());
        };

        debug!(
            encoder = self.profile.name(),
            quality,
            output = %output.display(),
            "Encoding candidate"
        );

        let outcome = {
            let _slot = self.permit.as_ref().map(|p| p.acquire());
            run_to_completion(Command::new(program).args(args))?
        };
        log_external_tool(
            program,
            args,
            &format_ffmpeg_error(&outcome.stderr),
            outcome.status.code(),
            outcome.duration,
        );

        if !outcome.success() {
            remove_if_exists(output)
                .with_context(|| format!("Failed to remove partial {}", output.display()))?;
            return Ok(false);
        }

        let Some(output_size) = file_size(output) else {
            warn!(output = %output.display(), "Encoder exited cleanly but wrote no output");
            return Ok(false);
        };

        if let Some(limit) = size_guard {
            let ratio = size_ratio(output_size, input_size);
            if ratio > limit {
                info!(
                    input = %input.display(),
                    ratio,
                    limit,
                    "Output exceeds size guard, keeping original"
                );
                remove_if_exists(output)?;
                copy_verbatim(input, output)?;
            }
        }

        Ok(true)
    }
}

impl CandidateEncoder for Compressor {
    fn profile(&self) -> &dyn EncoderProfile {
        self.profile.as_ref()
    }

    fn encode(&self, input: &Path, output: &Path, quality: i32) -> bool {
        self.compress_file(input, output, quality, None)
    }
}
