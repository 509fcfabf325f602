use std::sync::Mutex;

/// Pipeline stage. Runs move through these strictly in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Turning the source reference into a local file (fetching if remote).
    Resolving,
    /// Reading the duration of the first audio stream.
    Probing,
    /// Transcoding to mono 16-bit PCM.
    Decoding,
    /// Streaming samples into the plotter.
    Rendering,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Resolving => "resolving input",
            Stage::Probing => "probing duration",
            Stage::Decoding => "decoding samples",
            Stage::Rendering => "rendering waveform",
        })
    }
}

/// External program a diagnostic line came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tool {
    /// `ffprobe`.
    Probe,
    /// `ffmpeg`.
    Decoder,
    /// `gnuplot` (or `gnuplot-nox`).
    Plotter,
}

/// Which output stream of a child process a line was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Sink for stage transitions and child process output.
///
/// Implementations are shared across the drain threads of a run, so they must be `Sync`.
pub trait Diagnostics: Send + Sync {
    /// Called when the pipeline enters `stage`.
    fn stage_entered(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once per line written by a child process.
    fn tool_output(&self, tool: Tool, stream: OutputStream, line: &str);
}

/// Forwards everything to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn stage_entered(&self, stage: Stage) {
        tracing::debug!(%stage, "stage entered");
    }

    fn tool_output(&self, tool: Tool, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => tracing::info!(?tool, "{line}"),
            OutputStream::Stderr => tracing::warn!(?tool, "{line}"),
        }
    }
}

/// One recorded diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// See [`Diagnostics::stage_entered`].
    StageEntered(Stage),
    /// See [`Diagnostics::tool_output`].
    ToolOutput {
        /// Emitting program.
        tool: Tool,
        /// Stream the line was read from.
        stream: OutputStream,
        /// The line, without its terminator.
        line: String,
    },
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingDiagnostics {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Stages entered so far, in order.
    pub fn stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::StageEntered(stage) => Some(stage),
                DiagnosticEvent::ToolOutput { .. } => None,
            })
            .collect()
    }

    /// Lines written by `tool`, across both streams.
    pub fn lines_from(&self, tool: Tool) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::ToolOutput { tool: t, line, .. } if t == tool => Some(line),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn stage_entered(&self, stage: Stage) {
        self.push(DiagnosticEvent::StageEntered(stage));
    }

    fn tool_output(&self, tool: Tool, stream: OutputStream, line: &str) {
        self.push(DiagnosticEvent::ToolOutput {
            tool,
            stream,
            line: line.to_string(),
        });
    }
}
