//! Wavegram turns an audio file or URL into a PNG waveform whose width is proportional to the
//! clip's duration.
//!
//! A run is a one-shot pipeline:
//!
//! - resolve the input (downloading `http(s)` sources into a per-run workspace)
//! - probe the first audio stream's duration with `ffprobe`
//! - decode to mono 16-bit PCM at 2 kHz with `ffmpeg`
//! - stream the samples into `gnuplot`, which writes a `round(duration * 100)` x 100 PNG
//!
//! The quickest entry point is [`generate_waveform_image`]; [`WaveformPipeline`] exposes
//! deadlines, cancellation and diagnostics.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Toolchain and pipeline options.
pub mod config;
/// Source resolution and remote fetch.
pub mod input;
pub mod media;
/// Pipeline orchestration.
pub mod pipeline;
pub mod render;
/// Per-run scratch directories.
pub mod workspace;

pub use crate::config::{
    IMAGE_HEIGHT, PIXELS_PER_SECOND, PLOTTER_ENV, PipelineOpts, SAMPLE_RATE_HZ, Toolchain,
};
pub use crate::foundation::control::{CancelToken, RunControl};
pub use crate::foundation::diagnostics::{
    DiagnosticEvent, Diagnostics, OutputStream, RecordingDiagnostics, Stage, Tool,
    TracingDiagnostics,
};
pub use crate::foundation::error::{WavegramError, WavegramResult};
pub use crate::input::{ResolvedInput, SourceRef, resolve_input};
pub use crate::media::decode::decode_samples;
pub use crate::media::probe::probe_duration;
pub use crate::pipeline::{WaveformPipeline, generate_waveform_image, probe_source};
pub use crate::render::geometry::{image_width_for, verify_image};
pub use crate::render::plot::{plot_script, render_waveform};
pub use crate::workspace::RunWorkspace;
