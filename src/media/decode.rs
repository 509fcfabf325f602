use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use crate::config::{SAMPLE_RATE_HZ, Toolchain};
use crate::foundation::control::RunControl;
use crate::foundation::diagnostics::{Diagnostics, Stage, Tool};
use crate::foundation::error::{WavegramError, WavegramResult};
use crate::foundation::process::{StdoutMode, run_tool};

/// Transcode the first audio stream of `input` into headerless mono `s16le` PCM at
/// [`SAMPLE_RATE_HZ`], written to `dest`. Returns the number of bytes produced.
#[tracing::instrument(skip(toolchain, ctl, diag))]
pub fn decode_samples(
    toolchain: &Toolchain,
    input: &Path,
    dest: &Path,
    ctl: &RunControl,
    diag: &dyn Diagnostics,
) -> WavegramResult<u64> {
    ctl.check(Stage::Decoding)?;

    let mut cmd = Command::new(&toolchain.ffmpeg);
    cmd.args(decode_args(input, dest));

    let run = run_tool(
        cmd,
        None,
        StdoutMode::Forward,
        Tool::Decoder,
        Stage::Decoding,
        ctl,
        diag,
    )?;
    if !run.status.success() {
        return Err(WavegramError::decode(format!(
            "ffmpeg decode failed for '{}' ({}): {}",
            input.display(),
            run.status,
            run.stderr.trim()
        )));
    }

    let bytes = std::fs::metadata(dest)
        .map_err(|e| {
            WavegramError::decode(format!(
                "ffmpeg reported success but '{}' is unreadable: {e}",
                dest.display()
            ))
        })?
        .len();
    if bytes == 0 {
        return Err(WavegramError::decode(format!(
            "ffmpeg produced no samples for '{}'",
            input.display()
        )));
    }
    if bytes % 2 != 0 {
        // Truncated tail sample; the plotter ignores it.
        tracing::warn!(bytes, "decoded stream is not aligned to 16-bit samples");
    }
    tracing::debug!(bytes, samples = bytes / 2, "decoded samples");
    Ok(bytes)
}

/// Arguments for the fixed decode configuration.
pub(crate) fn decode_args(input: &Path, dest: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());
    args.extend(
        [
            "-map",
            "0:a:0",
            "-vn",
            "-acodec",
            "pcm_s16le",
            "-ac",
            "1",
            "-ar",
            &SAMPLE_RATE_HZ.to_string(),
            "-f",
            "data",
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(dest.as_os_str().to_owned());
    args
}
