use std::path::Path;
use std::process::Command;

use crate::config::Toolchain;
use crate::foundation::control::RunControl;
use crate::foundation::diagnostics::{Diagnostics, Stage, Tool};
use crate::foundation::error::{WavegramError, WavegramResult};
use crate::foundation::process::{StdoutMode, run_tool};

#[derive(serde::Deserialize)]
struct ProbeStream {
    duration: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

/// Read the duration in seconds of the first audio stream in `input` through `ffprobe`.
///
/// Fails when `ffprobe` errors, when the file has no audio stream, or when the stream's
/// duration is absent or not a finite non-negative number. There is no fallback to zero.
#[tracing::instrument(skip(toolchain, ctl, diag))]
pub fn probe_duration(
    toolchain: &Toolchain,
    input: &Path,
    ctl: &RunControl,
    diag: &dyn Diagnostics,
) -> WavegramResult<f64> {
    ctl.check(Stage::Probing)?;

    let mut cmd = Command::new(&toolchain.ffprobe);
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_streams",
        "-select_streams",
        "a",
    ])
    .arg(input);

    let run = run_tool(
        cmd,
        None,
        StdoutMode::Capture,
        Tool::Probe,
        Stage::Probing,
        ctl,
        diag,
    )?;
    if !run.status.success() {
        return Err(WavegramError::probe(format!(
            "ffprobe failed for '{}' ({}): {}",
            input.display(),
            run.status,
            run.stderr.trim()
        )));
    }

    let secs = parse_probe_output(&run.stdout)?;
    tracing::debug!(secs, "probed duration");
    Ok(secs)
}

/// Extract the first stream's duration from `ffprobe -print_format json` output.
pub(crate) fn parse_probe_output(json: &[u8]) -> WavegramResult<f64> {
    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| WavegramError::probe(format!("ffprobe json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| WavegramError::probe("no audio stream found"))?;
    let raw = stream
        .duration
        .as_deref()
        .ok_or_else(|| WavegramError::probe("failed to parse audio track: missing duration"))?;
    let secs: f64 = raw.trim().parse().map_err(|_| {
        WavegramError::probe(format!("failed to parse audio track: duration '{raw}'"))
    })?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(WavegramError::probe(format!(
            "failed to parse audio track: duration '{raw}' is not a finite non-negative number"
        )));
    }
    Ok(secs)
}
