use super::{path_arg, EncoderProfile};
use std::path::Path;

/// Intel Quick Sync (`hevc_qsv`). Lower `global_quality` = better.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntelEncoder;

impl EncoderProfile for IntelEncoder {
    fn name(&self) -> &str {
        "intel"
    }

    fn codec_name(&self) -> &str {
        "hevc_qsv"
    }

    fn default_quality(&self) -> i32 {
        25
    }

    fn quality_step(&self) -> i32 {
        -1
    }

    fn quality_range(&self) -> (i32, i32) {
        (1, 51)
    }

    fn build_command(&self, input: &Path, output: &Path, quality: i32) -> Vec<String> {
        [
            "ffmpeg",
            "-hwaccel",
            "qsv",
            "-hwaccel_output_format",
            "qsv",
            "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain([path_arg(input)])
        .chain(
            [
                "-c:v",
                self.codec_name(),
                "-vtag",
                "hvc1",
                "-preset",
                "veryslow",
                "-global_quality",
            ]
            .iter()
            .map(|s| s.to_string()),
        )
        .chain([quality.to_string()])
        .chain(
            ["-c:a", "copy", "-map_metadata", "0", "-y"]
                .iter()
                .map(|s| s.to_string()),
        )
        .chain([path_arg(output)])
        .collect()
    }
}
