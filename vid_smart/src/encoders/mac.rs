use super::{path_arg, EncoderProfile};
use std::collections::BTreeSet;
use std::path::Path;

/// `-q:v` values that VideoToolbox maps onto the same output as a
/// neighbouring value. Measured on Apple Silicon; encoding them again only
/// repeats a neighbour's result.
pub const KNOWN_DUPLICATE_QUALITIES: &[i32] = &[
    3, 4, 6, 7, 9, 10, 12, 13, 15, 16, 18, 20, 21, 23, 24, 26, 27, 29, 31, 32, 34, 35, 37, 39, 40,
    42, 44, 45, 47, 49, 50, 52, 54, 56, 58, 59, 61, 63, 65, 67, 69, 71, 73, 75, 77, 80, 82, 85,
];

/// Apple VideoToolbox (`hevc_videotoolbox`). Higher `-q:v` = better.
#[derive(Debug, Clone)]
pub struct MacEncoder {
    duplicates: BTreeSet<i32>,
}

impl Default for MacEncoder {
    fn default() -> Self {
        Self::with_duplicate_table(KNOWN_DUPLICATE_QUALITIES.iter().copied())
    }
}

impl MacEncoder {
    /// Replace the skip table, e.g. after re-measuring on different hardware
    pub fn with_duplicate_table(values: impl IntoIterator<Item = i32>) -> Self {
        Self {
            duplicates: values.into_iter().collect(),
        }
    }
}

impl EncoderProfile for MacEncoder {
    fn name(&self) -> &str {
        "mac"
    }

    fn codec_name(&self) -> &str {
        "hevc_videotoolbox"
    }

    fn default_quality(&self) -> i32 {
        58
    }

    fn quality_step(&self) -> i32 {
        1
    }

    fn quality_range(&self) -> (i32, i32) {
        (1, 100)
    }

    fn is_valid_quality(&self, quality: i32) -> bool {
        !self.duplicates.contains(&quality)
    }

    fn build_command(&self, input: &Path, output: &Path, quality: i32) -> Vec<String> {
        let mut args: Vec<String> = ["ffmpeg", "-hwaccel", "videotoolbox", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(path_arg(input));
        args.extend(
            ["-c:v", self.codec_name(), "-vtag", "hvc1", "-q:v"]
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
    fn test_mac_validity_table() {
        let mac = MacEncoder::default();
        assert!(!mac.is_valid_quality(58));
        assert!(!mac.is_valid_quality(3));
        assert!(mac.is_valid_quality(57));
        assert!(mac.is_valid_quality(60));
        assert!(mac.is_valid_quality(100));
    }

    #[test]
    fn test_mac_custom_table() {
        let mac = MacEncoder::with_duplicate_table([10, 11]);
        assert!(!mac.is_valid_quality(11));
        assert!(mac.is_valid_quality(58));
    }

    #[test]
    fn test_mac_command_quality_flag() {
        let cmd = MacEncoder::default().build_command(Path::new("a.mov"), Path::new("b.mov"), 60);
        assert!(cmd.windows(2).any(|w| w[0] == "-q:v" && w[1] == "60"));
        assert!(cmd.windows(2).any(|w| w[0] == "-hwaccel" && w[1] == "videotoolbox"));
    }
}
