use std::{ffi::OsStr, fmt::Debug, path::Path};

use miette::{Context, IntoDiagnostic};
use serde::Deserialize;

use crate::result::{bail, Result};

use super::command::{
    assert_success_command, run_command, Capture, FFMPEG, FFPROBE, FFXXX_DEFAULT_ARGS,
};

/// Container-level facts needed to size a split
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    /// Overall bit rate in bits per second, when the container reports one
    pub bit_rate: Option<u64>,
}

/// Interface over the external demuxing toolchain.
///
/// Implementations never re-encode: `segment` is a stream-copy remux so
/// every produced piece stays independently playable.
pub trait StreamSplitter: Sync + Debug {
    /// Inspect a media file's overall bit rate and duration
    fn probe(&self, input: &Path) -> Result<MediaInfo>;

    /// Cut `input` into time-based segments of roughly `segment_secs`
    /// seconds each, written into `out_dir` as sequentially numbered files
    /// sharing the source container extension (`name.part001.ext`, ...).
    fn segment(&self, input: &Path, out_dir: &Path, segment_secs: u64) -> Result<()>;
}

/// Interface for the [ffmpeg](https://ffmpeg.org) and `ffprobe` programs
#[derive(Debug)]
pub struct Ffmpeg;

impl Ffmpeg {
    /// Verify that the `ffmpeg` and `ffprobe` binaries are reachable.
    ///
    /// Called once at startup so a missing toolchain is a clear diagnostic
    /// instead of a mid-batch subprocess failure.
    pub fn new() -> Result<Self> {
        assert_success_command(FFMPEG, |cmd| cmd.arg("-version"))
            .map_err(|err| err.wrap_err_with(|| "ffmpeg not found in PATH"))?;
        assert_success_command(FFPROBE, |cmd| cmd.arg("-version"))
            .map_err(|err| err.wrap_err_with(|| "ffprobe not found in PATH"))?;

        Ok(Self)
    }
}

impl StreamSplitter for Ffmpeg {
    fn probe(&self, input: &Path) -> Result<MediaInfo> {
        let res = run_command(
            FFPROBE,
            |cmd| {
                cmd.args(FFXXX_DEFAULT_ARGS)
                    .args(["-print_format", "json"])
                    .arg("-show_format")
                    .arg("--")
                    .arg(input)
            },
            Capture::STDOUT,
        )?;

        if !res.status.success() {
            return bail("ffprobe did run but was not successful");
        }

        let stdout = String::from_utf8_lossy(&res.stdout);
        parse_probe_output(&stdout)
    }

    fn segment(&self, input: &Path, out_dir: &Path, segment_secs: u64) -> Result<()> {
        let pattern = segment_pattern(input, out_dir)?;

        assert_success_command(FFMPEG, |cmd| {
            cmd.args(FFXXX_DEFAULT_ARGS)
                .arg("-y")
                .args([OsStr::new("-i"), input.as_os_str()])
                .args(["-map", "0"])
                .args(["-c", "copy"])
                .args(["-f", "segment"])
                .args(["-segment_time", &segment_secs.to_string()])
                .args(["-segment_start_number", "1"])
                .args(["-reset_timestamps", "1"])
                .arg("--")
                .arg(&pattern)
        })
        .map_err(|err| err.wrap_err_with(|| "Segmentation remux failed"))
    }
}

/// Output filename pattern for the segment muxer: `<stem>.part%03d.<ext>`
fn segment_pattern(input: &Path, out_dir: &Path) -> Result<std::path::PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| crate::result::err_msg("Input file has no usable name"))?;
    let ext = input
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| crate::result::err_msg("Input file has no extension"))?;

    Ok(out_dir.join(format!("{stem}.part%03d.{ext}")))
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    // ffprobe reports numbers as JSON strings
    duration: Option<String>,
    bit_rate: Option<String>,
}

fn parse_probe_output(json: &str) -> Result<MediaInfo> {
    let parsed: ProbeOutput = serde_json::from_str(json)
        .into_diagnostic()
        .wrap_err("Could not parse ffprobe JSON output")?;

    let duration_secs = parsed
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| crate::result::err_msg("ffprobe output has no duration"))?;

    let bit_rate = parsed
        .format
        .bit_rate
        .as_deref()
        .and_then(|b| b.parse::<u64>().ok())
        .filter(|&b| b > 0);

    Ok(MediaInfo {
        duration_secs,
        bit_rate,
    })
}
