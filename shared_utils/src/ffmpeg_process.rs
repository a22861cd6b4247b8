//! FFmpeg 进程管理模块 - 防止管道死锁
//!
//! 编码与 VMAF 计算都会向 stderr 输出大量日志。如果 stderr 被 pipe 但
//! 没有人读取，超过管道缓冲区（通常 64KB）后 ffmpeg 会阻塞。
//! 这里用独立线程持续消耗 stderr，并在进程结束后把完整内容交给调用方
//! （VMAF 分数就在 stderr 里）。

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ═══════════════════════════════════════════════════════════════
// FfmpegProcess - 防死锁的进程包装器
// ═══════════════════════════════════════════════════════════════

/// 外部进程包装器 - 自动消耗 stderr
pub struct FfmpegProcess {
    child: Child,
    command: String,
    started: Instant,
    stderr_thread: Option<JoinHandle<String>>,
}

/// 进程结束后的结果
#[derive(Debug)]
pub struct FfmpegOutcome {
    pub status: ExitStatus,
    pub stderr: String,
    pub duration: Duration,
}

impl FfmpegOutcome {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

impl FfmpegProcess {
    /// 启动进程。stdout 丢弃，stderr 由后台线程收集。
    pub fn spawn(cmd: &mut Command) -> Result<Self> {
        let command = format!("{:?}", cmd);
        debug!(command = %command, "Spawning external process");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn process: {}", command))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture stderr of {}", command))?;

        let stderr_thread = thread::spawn(move || {
            let mut buf = String::new();
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(|l| l.ok()) {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        Ok(Self {
            child,
            command,
            started: Instant::now(),
            stderr_thread: Some(stderr_thread),
        })
    }

    /// 等待进程结束并取回 stderr
    pub fn wait_with_output(mut self) -> Result<FfmpegOutcome> {
        let status = self
            .child
            .wait()
            .with_context(|| format!("Failed to wait for {}", self.command))?;
        let stderr = self
            .stderr_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();
        let duration = self.started.elapsed();

        if status.success() {
            debug!(
                exit_code = status.code(),
                duration_secs = duration.as_secs_f64(),
                "External process completed successfully"
            );
        } else {
            warn!(
                command = %self.command,
                exit_code = status.code(),
                error = %format_ffmpeg_error(&stderr),
                "External process failed"
            );
        }

        Ok(FfmpegOutcome {
            status,
            stderr,
            duration,
        })
    }
}

/// 便捷函数：启动并等待
pub fn run_to_completion(cmd: &mut Command) -> Result<FfmpegOutcome> {
    FfmpegProcess::spawn(cmd)?.wait_with_output()
}

// ═══════════════════════════════════════════════════════════════
// 输出解析
// ═══════════════════════════════════════════════════════════════

/// 从 stderr 中提取最有意义的错误信息
///
/// 1. 优先返回最后一行包含 "Error"/"error" 的内容
/// 2. 否则返回最后一行非进度输出
/// 3. 全空时返回 "Unknown FFmpeg error"
pub fn format_ffmpeg_error(stderr: &str) -> String {
    if let Some(error_line) = stderr
        .lines()
        .rev()
        .find(|line| line.contains("Error") || line.contains("error"))
    {
        return error_line.trim().to_string();
    }

    stderr
        .lines()
        .rev()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("frame=")
                && !trimmed.starts_with("fps=")
                && !trimmed.starts_with("size=")
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown FFmpeg error".to_string())
}

/// 解析 `"<metric> score: <float>"`（或 `=`）行，最后一个匹配行生效
///
/// libvmaf 输出示例：`[Parsed_libvmaf_0 @ 0x600] VMAF score: 95.123456`
pub fn parse_metric_score(stderr: &str, metric: &str) -> Option<f64> {
    let marker = format!("{} score", metric);
    stderr
        .lines()
        .rev()
        .filter_map(|line| {
            let idx = line.find(&marker)?;
            let rest = line[idx + marker.len()..].trim_start();
            let rest = rest.strip_prefix(':').or_else(|| rest.strip_prefix('='))?;
            let number: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            number.parse::<f64>().ok()
        })
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ffmpeg_error_with_error_line() {
        let stderr = r#"
frame=  100 fps=25.0 q=28.0 size=    1024kB time=00:00:04.00 bitrate=2097.2kbits/s
[hevc_nvenc @ 0x7f8b8c000000] Error: No capable devices found
"#;
        let error = format_ffmpeg_error(stderr);
        assert!(error.contains("No capable devices found"));
    }

    #[test]
    fn test_format_ffmpeg_error_no_error_line() {
        let stderr = "frame=  100 fps=25.0\nConversion failed!\n";
        assert_eq!(format_ffmpeg_error(stderr), "Conversion failed!");
    }

    #[test]
    fn test_format_ffmpeg_error_empty() {
        assert_eq!(format_ffmpeg_error(""), "Unknown FFmpeg error");
    }

    #[test]
    fn test_parse_metric_score_last_match_wins() {
        let stderr = "\
[Parsed_libvmaf_0 @ 0x1] VMAF score: 80.5
frame= 240 fps= 60
[Parsed_libvmaf_0 @ 0x1] VMAF score: 95.123456
";
        assert_eq!(parse_metric_score(stderr, "VMAF"), Some(95.123456));
    }

    #[test]
    fn test_parse_metric_score_equals_form() {
        assert_eq!(parse_metric_score("VMAF score=88.25", "VMAF"), Some(88.25));
    }

    #[test]
    fn test_parse_metric_score_ignores_unparseable_tail() {
        let stderr = "VMAF score: 91.0\nVMAF score: nan\n";
        assert_eq!(parse_metric_score(stderr, "VMAF"), Some(91.0));
    }

    #[test]
    fn test_parse_metric_score_missing() {
        assert_eq!(parse_metric_score("Conversion failed!", "VMAF"), None);
        assert_eq!(parse_metric_score("", "VMAF"), None);
    }

    #[test]
    fn test_run_to_completion_captures_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'VMAF score: 42.5' 1>&2; exit 3"]);
        let outcome = run_to_completion(&mut cmd).unwrap();
        assert!(!outcome.success());
        assert_eq!(parse_metric_score(&outcome.stderr, "VMAF"), Some(42.5));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// 任意非空 stderr，错误格式化结果非空
        #[test]
        fn prop_format_error_non_empty(content in "[a-zA-Z0-9 ]{1,100}") {
            let error = format_ffmpeg_error(&content);
            prop_assert!(!error.is_empty());
        }

        /// 写入的分数在任意噪声行之后仍能原样解析
        #[test]
        fn prop_parse_metric_score_roundtrips_value(
            score in 0.0f64..100.0,
            noise in "[a-z ]{0,40}"
        ) {
            let stderr = format!("{}\nVMAF score: {:.6}\n{}", noise, score, noise);
            let parsed = parse_metric_score(&stderr, "VMAF");
            prop_assert!(parsed.is_some());
            prop_assert!((parsed.unwrap() - score).abs() < 1e-5);
        }
    }
}
