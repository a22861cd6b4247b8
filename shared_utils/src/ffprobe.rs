//! FFprobe wrapper module
//!
//! Bitrate and resolution probes used by the quality scorer.
//! Unparseable or missing output is `None`, never an error: the caller treats
//! it as a measurement failure.

use crate::logging::execute_external_command;
use serde::Deserialize;
use std::path::Path;

/// Average bitrate in kbps.
///
/// Tries the first video stream's `bit_rate` first, then the container-level
/// `format=bit_rate`.
pub fn probe_bitrate_kbps(ffprobe_bin: &str, path: &Path) -> Option<f64> {
    let path_str = path.to_str()?.to_string();

    let stream_args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "v:0".to_string(),
        "-show_entries".to_string(),
        "stream=bit_rate".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path_str.clone(),
    ];
    if let Some(kbps) = run_bitrate_probe(ffprobe_bin, &stream_args) {
        return Some(kbps);
    }

    let format_args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=bit_rate".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path_str,
    ];
    run_bitrate_probe(ffprobe_bin, &format_args)
}

fn run_bitrate_probe(ffprobe_bin: &str, args: &[String]) -> Option<f64> {
    let result = execute_external_command(ffprobe_bin, args).ok()?;
    if !result.success() {
        return None;
    }
    parse_bitrate_output(&result.stdout)
}

/// Parse `ffprobe ... nokey=1` bitrate output (bits/s) into kbps.
pub fn parse_bitrate_output(output: &str) -> Option<f64> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line == "N/A" {
        return None;
    }
    let bits = line.parse::<f64>().ok()?;
    if !bits.is_finite() || bits <= 0.0 {
        return None;
    }
    Some(bits / 1000.0)
}

/// Width and height of the first video stream.
pub fn probe_resolution(ffprobe_bin: &str, path: &Path) -> Option<(u32, u32)> {
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "v:0".to_string(),
        "-show_entries".to_string(),
        "stream=width,height".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        path.to_str()?.to_string(),
    ];
    let result = execute_external_command(ffprobe_bin, &args).ok()?;
    if !result.success() {
        return None;
    }
    parse_resolution_json(&result.stdout)
}

#[derive(Debug, Deserialize)]
struct ProbeStreams {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

/// Parse `-print_format json -show_entries stream=width,height` output.
pub fn parse_resolution_json(json_str: &str) -> Option<(u32, u32)> {
    let parsed: ProbeStreams = serde_json::from_str(json_str).ok()?;
    let stream = parsed.streams.first()?;
    match (stream.width?, stream.height?) {
        (0, _) | (_, 0) => None,
        (w, h) => Some((w, h)),
    }
}
