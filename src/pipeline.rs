use std::path::Path;

use crate::config::{PipelineOpts, Toolchain};
use crate::foundation::control::RunControl;
use crate::foundation::diagnostics::{Diagnostics, Stage};
use crate::foundation::error::WavegramResult;
use crate::input::{SourceRef, resolve_input};
use crate::media::decode::decode_samples;
use crate::media::probe::probe_duration;
use crate::render::geometry::{image_width_for, verify_image};
use crate::render::plot::{discard_partial_output, render_waveform};
use crate::workspace::RunWorkspace;

/// Position of a run in its state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RunState {
    /// Not started.
    Start,
    /// Working on a stage.
    Running(Stage),
    /// Image written.
    Done,
    /// Aborted in the given stage.
    Failed(Stage),
}

impl RunState {
    /// Return `true` for `Done` and `Failed`.
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// Render `input` (a local path or `http(s)` URL) as a waveform PNG at `output`.
///
/// Detects the toolchain and runs with default options: no deadline, output verification on,
/// diagnostics through `tracing`.
pub fn generate_waveform_image(input: &str, output: impl AsRef<Path>) -> WavegramResult<()> {
    WaveformPipeline::new(PipelineOpts::new(Toolchain::detect())).run(input, output)
}

/// Resolve -> probe -> decode -> render, strictly in that order.
///
/// Runs share nothing: each gets its own [`RunWorkspace`] which is removed when the run ends,
/// however it ends.
#[derive(Clone, Debug)]
pub struct WaveformPipeline {
    opts: PipelineOpts,
}

impl WaveformPipeline {
    /// Create a pipeline with `opts`.
    pub fn new(opts: PipelineOpts) -> Self {
        Self { opts }
    }

    /// Options this pipeline runs with.
    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    /// Run once. On success the only effect is the image at `output`.
    pub fn run(&self, input: &str, output: impl AsRef<Path>) -> WavegramResult<()> {
        let workspace = self.opts.create_workspace()?;
        self.run_in(&workspace, input, output.as_ref())
    }

    /// Run once using a caller-provided workspace.
    ///
    /// The caller owns the workspace and decides when it is removed.
    pub fn run_in(
        &self,
        workspace: &RunWorkspace,
        input: &str,
        output: &Path,
    ) -> WavegramResult<()> {
        let ctl = self.opts.run_control();
        let mut run = Run {
            state: RunState::Start,
            diag: self.opts.diagnostics.as_ref(),
        };
        let span = tracing::info_span!("waveform", input, workspace = %workspace.id());
        let _guard = span.enter();

        let result = self.drive(&mut run, workspace, input, output, &ctl);
        match &result {
            Ok(()) => {
                run.state = RunState::Done;
                tracing::info!(output = %output.display(), "waveform written");
            }
            Err(e) => {
                let stage = match run.state {
                    RunState::Running(stage) => stage,
                    _ => e.stage().unwrap_or(Stage::Resolving),
                };
                run.state = RunState::Failed(stage);
                tracing::warn!(%stage, "waveform run failed: {e}");
            }
        }
        debug_assert!(run.state.is_terminal());
        result
    }

    fn drive(
        &self,
        run: &mut Run<'_>,
        workspace: &RunWorkspace,
        input: &str,
        output: &Path,
        ctl: &RunControl,
    ) -> WavegramResult<()> {
        let toolchain = &self.opts.toolchain;
        let diag = run.diag;

        run.enter(Stage::Resolving);
        let source = SourceRef::classify(input);
        let resolved = resolve_input(&source, workspace, ctl)?;

        run.enter(Stage::Probing);
        let duration = probe_duration(toolchain, &resolved.path, ctl, diag)?;
        let width = image_width_for(duration)?;
        tracing::info!(duration, width, "sized waveform");

        run.enter(Stage::Decoding);
        let samples = workspace.samples_path();
        decode_samples(toolchain, &resolved.path, &samples, ctl, diag)?;

        run.enter(Stage::Rendering);
        render_waveform(toolchain, &samples, output, width, ctl, diag)?;
        if self.opts.verify_output {
            verify_image(output, width).inspect_err(|_| discard_partial_output(output))?;
        }
        Ok(())
    }
}

struct Run<'a> {
    state: RunState,
    diag: &'a dyn Diagnostics,
}

impl Run<'_> {
    fn enter(&mut self, stage: Stage) {
        self.state = RunState::Running(stage);
        self.diag.stage_entered(stage);
    }
}

/// Resolve and probe `input`, returning its duration in seconds without rendering.
pub fn probe_source(opts: &PipelineOpts, input: &str) -> WavegramResult<f64> {
    let workspace = opts.create_workspace()?;
    let ctl = opts.run_control();
    let diag = opts.diagnostics.as_ref();

    diag.stage_entered(Stage::Resolving);
    let resolved = resolve_input(&SourceRef::classify(input), &workspace, &ctl)?;
    diag.stage_entered(Stage::Probing);
    probe_duration(&opts.toolchain, &resolved.path, &ctl, diag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::error::WavegramError;

    #[test]
    fn terminal_states() {
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed(Stage::Probing).is_terminal());
        assert!(!RunState::Start.is_terminal());
        assert!(!RunState::Running(Stage::Decoding).is_terminal());
    }

    #[test]
    fn cancelled_run_stops_before_resolving() {
        let token = crate::CancelToken::new();
        token.cancel();
        let diag = std::sync::Arc::new(crate::RecordingDiagnostics::new());
        let opts = PipelineOpts::new(Toolchain::default())
            .with_cancel(token)
            .with_diagnostics(diag.clone());
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.png");

        let err = WaveformPipeline::new(opts)
            .run("whatever.wav", &out)
            .unwrap_err();
        assert!(matches!(
            err,
            WavegramError::Cancelled {
                stage: Stage::Resolving
            }
        ));
        assert_eq!(diag.stages(), vec![Stage::Resolving]);
        assert!(!out.exists());
    }

    #[test]
    fn workspace_is_removed_after_failed_run() {
        let parent = tempfile::tempdir().unwrap();
        let ws = RunWorkspace::create_in(parent.path()).unwrap();
        let ws_path = ws.path().to_path_buf();
        let pipeline = WaveformPipeline::new(
            PipelineOpts::new(Toolchain::default().with_ffprobe("/nonexistent/ffprobe")),
        );

        let err = pipeline
            .run_in(&ws, "missing.wav", &parent.path().join("out.png"))
            .unwrap_err();
        assert!(matches!(err, WavegramError::Probe(_)));
        drop(ws);
        assert!(!ws_path.exists());
    }
}
