use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::foundation::control::{CancelToken, RunControl};
use crate::foundation::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::foundation::error::WavegramResult;
use crate::foundation::process::answers_version;
use crate::workspace::RunWorkspace;

/// Horizontal resolution of the waveform: one second of audio spans this many pixels.
pub const PIXELS_PER_SECOND: u32 = 100;

/// Fixed height of every waveform image, independent of duration.
pub const IMAGE_HEIGHT: u32 = 100;

/// Sample rate of the intermediate PCM stream fed to the plotter.
pub const SAMPLE_RATE_HZ: u32 = 2000;

/// Environment variable that overrides plotter detection.
pub const PLOTTER_ENV: &str = "WAVEGRAM_GNUPLOT";

const PLOTTER_CANDIDATES: [&str; 2] = ["gnuplot", "gnuplot-nox"];

/// Locations of the external programs a run shells out to.
///
/// Resolved once (usually at startup) and handed to every component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toolchain {
    /// `ffmpeg` executable used for decoding.
    pub ffmpeg: PathBuf,
    /// `ffprobe` executable used for duration extraction.
    pub ffprobe: PathBuf,
    /// `gnuplot` (or `gnuplot-nox`) executable used for rendering.
    pub plotter: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            plotter: PathBuf::from(PLOTTER_CANDIDATES[0]),
        }
    }
}

impl Toolchain {
    /// Resolve the toolchain from `PATH` and [`PLOTTER_ENV`].
    ///
    /// The plotter is `$WAVEGRAM_GNUPLOT` when set, else `gnuplot` when it answers
    /// `--version`, else `gnuplot-nox`. Detection never fails; a missing program surfaces as a
    /// stage error when it is first spawned.
    pub fn detect() -> Self {
        let plotter = std::env::var_os(PLOTTER_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                detect_plotter(|candidate| answers_version(Path::new(candidate), "--version"))
            });
        tracing::debug!(plotter = %plotter.display(), "resolved plotter");
        Self {
            plotter,
            ..Self::default()
        }
    }

    /// Use `path` for `ffmpeg`.
    pub fn with_ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg = path.into();
        self
    }

    /// Use `path` for `ffprobe`.
    pub fn with_ffprobe(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffprobe = path.into();
        self
    }

    /// Use `path` for the plotter.
    pub fn with_plotter(mut self, path: impl Into<PathBuf>) -> Self {
        self.plotter = path.into();
        self
    }

    /// Return `true` when both `ffmpeg` and `ffprobe` can be invoked.
    pub fn media_tools_available(&self) -> bool {
        answers_version(&self.ffmpeg, "-version") && answers_version(&self.ffprobe, "-version")
    }

    /// Return `true` when the plotter can be invoked.
    pub fn plotter_available(&self) -> bool {
        answers_version(&self.plotter, "--version")
    }
}

fn detect_plotter(mut installed: impl FnMut(&str) -> bool) -> PathBuf {
    let name = PLOTTER_CANDIDATES
        .iter()
        .copied()
        .find(|c| installed(c))
        .unwrap_or(PLOTTER_CANDIDATES[1]);
    PathBuf::from(name)
}

/// Options for [`WaveformPipeline`](crate::WaveformPipeline).
#[derive(Clone)]
pub struct PipelineOpts {
    /// External programs to use.
    pub toolchain: Toolchain,
    /// Upper bound on the whole run, measured from the start of `run`.
    pub timeout: Option<Duration>,
    /// Token a caller can trip to abort the run.
    pub cancel: Option<CancelToken>,
    /// Check the produced PNG's dimensions after the plotter exits.
    pub verify_output: bool,
    /// Where stage transitions and tool output go.
    pub diagnostics: Arc<dyn Diagnostics>,
    /// Directory run workspaces are created in; the system temp dir when `None`.
    pub workspace_root: Option<PathBuf>,
}

impl std::fmt::Debug for PipelineOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOpts")
            .field("toolchain", &self.toolchain)
            .field("timeout", &self.timeout)
            .field("cancel", &self.cancel)
            .field("verify_output", &self.verify_output)
            .field("workspace_root", &self.workspace_root)
            .finish_non_exhaustive()
    }
}

impl PipelineOpts {
    /// Options with `toolchain`, no deadline, output verification on, `tracing` diagnostics.
    pub fn new(toolchain: Toolchain) -> Self {
        Self {
            toolchain,
            timeout: None,
            cancel: None,
            verify_output: true,
            diagnostics: Arc::new(TracingDiagnostics),
            workspace_root: None,
        }
    }

    /// Bound the run by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the run when `cancel` is tripped.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Enable or disable output verification.
    pub fn with_verify_output(mut self, verify: bool) -> Self {
        self.verify_output = verify;
        self
    }

    /// Route diagnostics to `diagnostics`.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Create run workspaces under `root` instead of the system temp dir.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub(crate) fn run_control(&self) -> RunControl {
        RunControl::new(self.timeout, self.cancel.clone())
    }

    pub(crate) fn create_workspace(&self) -> WavegramResult<RunWorkspace> {
        match &self.workspace_root {
            Some(root) => RunWorkspace::create_in(root),
            None => RunWorkspace::create(),
        }
    }
}
