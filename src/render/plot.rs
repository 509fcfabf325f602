use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::Command;

use anyhow::Context as _;

use crate::config::{IMAGE_HEIGHT, Toolchain};
use crate::foundation::control::RunControl;
use crate::foundation::diagnostics::{Diagnostics, Stage, Tool};
use crate::foundation::error::{WavegramError, WavegramResult};
use crate::foundation::process::{StdoutMode, run_tool};

/// Build the `gnuplot` script that plots `s16le` samples from stdin into `output`.
///
/// Transparent true-color PNG of `width` x [`IMAGE_HEIGHT`], no key, tics, border or margins,
/// one black line through every sample.
pub fn plot_script(output: &Path, width: u32) -> String {
    let statements = [
        format!("set terminal png transparent truecolor size {width},{IMAGE_HEIGHT}"),
        format!("set output \"{}\"", escape_gnuplot_string(&output.to_string_lossy())),
        "unset key".to_string(),
        "unset tics".to_string(),
        "unset border".to_string(),
        "set lmargin 0".to_string(),
        "set rmargin 0".to_string(),
        "set tmargin 0".to_string(),
        "set bmargin 0".to_string(),
        "plot '<cat' binary filetype=bin format='%int16' endian=little array=1:0 \
         lc '#000000' with lines"
            .to_string(),
    ];
    let mut script = statements.join(";");
    script.push(';');
    script
}

fn escape_gnuplot_string(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Stream the PCM file at `samples` into the plotter and wait for it to write `output`.
///
/// Samples are piped as they are read, so the whole stream is never held in memory. A non-zero
/// exit code becomes a [`WavegramError::Render`] carrying that code. A plotter terminated
/// without an exit code (killed by a signal) is not treated as a failure here; output
/// verification catches a missing image. Once the plotter has been started, any failure removes
/// the file at `output`.
#[tracing::instrument(skip(toolchain, ctl, diag))]
pub fn render_waveform(
    toolchain: &Toolchain,
    samples: &Path,
    output: &Path,
    width: u32,
    ctl: &RunControl,
    diag: &dyn Diagnostics,
) -> WavegramResult<()> {
    ctl.check(Stage::Rendering)?;
    ensure_parent_dir(output)?;

    let file = File::open(samples).map_err(|e| {
        WavegramError::render(format!(
            "failed to open samples '{}': {e}",
            samples.display()
        ))
    })?;
    let mut reader = BufReader::new(file);

    let outcome = plot_samples(toolchain, &mut reader, output, width, ctl, diag);
    if outcome.is_err() {
        discard_partial_output(output);
    }
    outcome
}

fn plot_samples(
    toolchain: &Toolchain,
    samples: &mut (dyn std::io::Read + Send),
    output: &Path,
    width: u32,
    ctl: &RunControl,
    diag: &dyn Diagnostics,
) -> WavegramResult<()> {
    let mut cmd = Command::new(&toolchain.plotter);
    cmd.args(["-p", "-e"]).arg(plot_script(output, width));

    let run = run_tool(
        cmd,
        Some(samples),
        StdoutMode::Forward,
        Tool::Plotter,
        Stage::Rendering,
        ctl,
        diag,
    )?;

    match run.status.code() {
        Some(0) => {}
        Some(code) => return Err(WavegramError::render_exit(code)),
        None => tracing::warn!(status = %run.status, "plotter terminated without an exit code"),
    }

    match run.fed {
        Some(Ok(bytes)) => tracing::debug!(bytes, "streamed samples into plotter"),
        Some(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            tracing::warn!("plotter closed its input before consuming every sample");
        }
        Some(Err(e)) => {
            return Err(WavegramError::render(format!(
                "failed to stream samples into plotter: {e}"
            )));
        }
        None => {}
    }
    Ok(())
}

/// Remove whatever a failed render left at `output`.
pub(crate) fn discard_partial_output(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => tracing::debug!(output = %output.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(output = %output.display(), "could not remove partial output: {e}");
        }
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> WavegramResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}
