use super::{path_arg, EncoderProfile};
use std::path::Path;

/// NVENC (`hevc_nvenc`), constant-QP rate control. Lower `qp` = better.
#[derive(Debug, Clone, Copy, Default)]
pub struct NvidiaEncoder;

impl EncoderProfile for NvidiaEncoder {
    fn name(&self) -> &str {
        "nvidia"
    }

    fn codec_name(&self) -> &str {
        "hevc_nvenc"
    }

    fn default_quality(&self) -> i32 {
        24
    }

    fn quality_step(&self) -> i32 {
        -1
    }

    fn quality_range(&self) -> (i32, i32) {
        (0, 51)
    }

    fn build_command(&self, input: &Path, output: &Path, quality: i32) -> Vec<String> {
        let mut args: Vec<String> = vec!["ffmpeg".into(), "-i".into(), path_arg(input)];
        args.extend(
            [
                "-c:v",
                self.codec_name(),
                "-vtag",
                "hvc1",
                "-preset",
                "p7",
                "-multipass",
                "fullres",
                "-rc",
                "constqp",
                "-qp",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(quality.to_string());
        args.extend(
            ["-c:a", "copy", "-map_metadata", "0", "-y"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(path_arg(output));
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nvidia_command_uses_constqp() {
        let cmd = NvidiaEncoder.build_command(Path::new("a.mp4"), Path::new("b.mp4"), 19);
        assert!(cmd.windows(2).any(|w| w[0] == "-rc" && w[1] == "constqp"));
        assert!(cmd.windows(2).any(|w| w[0] == "-qp" && w[1] == "19"));
        assert!(!cmd.iter().any(|a| a == "-hwaccel"));
    }
}
