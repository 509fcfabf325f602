use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use crate::foundation::control::RunControl;
use crate::foundation::diagnostics::{Diagnostics, OutputStream, Stage, Tool};
use crate::foundation::error::{WavegramError, WavegramResult};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What to do with a child's stdout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StdoutMode {
    /// Keep the raw bytes for the caller (e.g. `ffprobe` JSON).
    Capture,
    /// Send each line to the diagnostics sink.
    Forward,
}

/// Result of a supervised child process run.
#[derive(Debug)]
pub(crate) struct ToolRun {
    pub(crate) status: ExitStatus,
    /// Empty unless run with [`StdoutMode::Capture`].
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: String,
    /// Outcome of feeding stdin; `None` when no input was supplied.
    pub(crate) fed: Option<std::io::Result<u64>>,
}

/// Spawn `cmd`, optionally stream `stdin` into it, and wait under `ctl`.
///
/// Stderr lines always go to `diag` as they arrive. Every pipe is drained on its own scoped
/// thread so a chatty child can never block on a full pipe while we wait on it.
pub(crate) fn run_tool(
    mut cmd: Command,
    stdin: Option<&mut (dyn Read + Send)>,
    stdout_mode: StdoutMode,
    tool: Tool,
    stage: Stage,
    ctl: &RunControl,
    diag: &dyn Diagnostics,
) -> WavegramResult<ToolRun> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        // Own group, so a stop can reach helpers the tool forks (wrapper scripts, `<cat`).
        cmd.process_group(0);
    }

    tracing::debug!(command = ?cmd, "spawning {program}");
    let mut child = cmd.spawn().map_err(|e| {
        WavegramError::at_stage(
            stage,
            format!("failed to spawn {program} (is it installed and on PATH?): {e}"),
        )
    })?;

    let child_stdin = child.stdin.take();
    let child_stdout = child.stdout.take().ok_or_else(|| {
        WavegramError::at_stage(stage, format!("failed to open {program} stdout"))
    })?;
    let child_stderr = child.stderr.take().ok_or_else(|| {
        WavegramError::at_stage(stage, format!("failed to open {program} stderr"))
    })?;

    std::thread::scope(|s| -> WavegramResult<ToolRun> {
        let feeder = match (stdin, child_stdin) {
            (Some(src), Some(mut dst)) => Some(s.spawn(move || {
                let copied = std::io::copy(src, &mut dst);
                let flushed = dst.flush();
                // `dst` drops here, closing the child's stdin.
                copied.and_then(|n| flushed.map(|_| n))
            })),
            _ => None,
        };
        let out_drain = s.spawn(move || match stdout_mode {
            StdoutMode::Capture => {
                let mut buf = Vec::new();
                let mut reader = child_stdout;
                reader.read_to_end(&mut buf).map(|_| buf)
            }
            StdoutMode::Forward => {
                forward_lines(child_stdout, tool, OutputStream::Stdout, diag).map(|_| Vec::new())
            }
        });
        let err_drain =
            s.spawn(move || forward_lines(child_stderr, tool, OutputStream::Stderr, diag));

        let status = wait_supervised(&mut child, ctl, stage);

        let fed = feeder.map(|h| {
            h.join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin feeder panicked")))
        });
        let stdout = out_drain.join().map_err(|_| {
            WavegramError::at_stage(stage, format!("{program} stdout drain panicked"))
        })?;
        let stderr = err_drain.join().map_err(|_| {
            WavegramError::at_stage(stage, format!("{program} stderr drain panicked"))
        })?;

        let status = status?;
        let stdout = stdout.map_err(|e| {
            WavegramError::at_stage(stage, format!("{program} stdout read failed: {e}"))
        })?;
        let stderr = stderr.map_err(|e| {
            WavegramError::at_stage(stage, format!("{program} stderr read failed: {e}"))
        })?;

        Ok(ToolRun {
            status,
            stdout,
            stderr,
            fed,
        })
    })
}

/// Wait for `child` while honouring `ctl`; the child's process group is killed when the run
/// must stop, which closes every inherited pipe and lets the drain threads finish.
pub(crate) fn wait_supervised(
    child: &mut Child,
    ctl: &RunControl,
    stage: Stage,
) -> WavegramResult<ExitStatus> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if let Err(stop) = ctl.check(stage) {
            tracing::warn!(%stage, pid = child.id(), "stopping child process: {stop}");
            kill_process_tree(child);
            return Err(stop);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let signalled = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if !matches!(signalled, Ok(s) if s.success()) {
            tracing::warn!(
                pid = child.id(),
                "could not signal process group; killing leader only"
            );
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn forward_lines(
    reader: impl Read,
    tool: Tool,
    stream: OutputStream,
    diag: &dyn Diagnostics,
) -> std::io::Result<String> {
    let mut collected = String::new();
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\r', '\n']);
        diag.tool_output(tool, stream, line);
        collected.push_str(line);
        collected.push('\n');
    }
    Ok(collected)
}

/// Return `true` when `program --version` (or `-version`) runs successfully.
pub(crate) fn answers_version(program: &std::path::Path, flag: &str) -> bool {
    Command::new(program)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::foundation::control::CancelToken;
    use crate::foundation::diagnostics::RecordingDiagnostics;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn captures_stdout_and_forwards_stderr() {
        let diag = RecordingDiagnostics::new();
        let run = run_tool(
            sh("echo '{\"a\":1}'; echo oops >&2"),
            None,
            StdoutMode::Capture,
            Tool::Probe,
            Stage::Probing,
            &RunControl::unbounded(),
            &diag,
        )
        .unwrap();

        assert!(run.status.success());
        assert_eq!(String::from_utf8_lossy(&run.stdout).trim(), "{\"a\":1}");
        assert_eq!(run.stderr.trim(), "oops");
        assert_eq!(diag.lines_from(Tool::Probe), vec!["oops".to_string()]);
        assert!(run.fed.is_none());
    }

    #[test]
    fn feeds_stdin_to_child() {
        let diag = RecordingDiagnostics::new();
        let mut input: &[u8] = b"one\ntwo\n";
        let run = run_tool(
            sh("cat"),
            Some(&mut input as &mut (dyn Read + Send)),
            StdoutMode::Forward,
            Tool::Plotter,
            Stage::Rendering,
            &RunControl::unbounded(),
            &diag,
        )
        .unwrap();

        assert!(run.status.success());
        assert_eq!(run.fed.unwrap().unwrap(), 8);
        assert_eq!(
            diag.lines_from(Tool::Plotter),
            vec!["one".to_string(), "two".to_string()]
        );
    }

    #[test]
    fn reports_nonzero_exit_status() {
        let diag = RecordingDiagnostics::new();
        let run = run_tool(
            sh("exit 3"),
            None,
            StdoutMode::Forward,
            Tool::Decoder,
            Stage::Decoding,
            &RunControl::unbounded(),
            &diag,
        )
        .unwrap();
        assert_eq!(run.status.code(), Some(3));
    }

    #[test]
    fn deadline_kills_long_running_child() {
        let diag = RecordingDiagnostics::new();
        let ctl = RunControl::new(Some(Duration::from_millis(50)), None);
        let started = std::time::Instant::now();
        let err = run_tool(
            sh("exec sleep 30"),
            None,
            StdoutMode::Forward,
            Tool::Decoder,
            Stage::Decoding,
            &ctl,
            &diag,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            WavegramError::TimedOut {
                stage: Stage::Decoding
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn deadline_reaches_grandchildren_holding_pipes() {
        let diag = RecordingDiagnostics::new();
        let ctl = RunControl::new(Some(Duration::from_millis(100)), None);
        let started = std::time::Instant::now();
        // `sh` forks `sleep`, which inherits stdout/stderr and outlives a leader-only kill.
        let err = run_tool(
            sh("sleep 6; echo late"),
            None,
            StdoutMode::Capture,
            Tool::Decoder,
            Stage::Decoding,
            &ctl,
            &diag,
        )
        .unwrap_err();

        assert!(matches!(err, WavegramError::TimedOut { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    }

    #[test]
    fn cancel_reaches_grandchildren_reading_stdin() {
        let diag = RecordingDiagnostics::new();
        let token = CancelToken::new();
        let ctl = RunControl::unbounded().with_cancel(token.clone());
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            token.cancel();
        });
        let started = std::time::Instant::now();
        // An endless input only ends when the child side of the pipe goes away.
        let mut input = std::io::repeat(0u8);
        let err = run_tool(
            sh("sleep 6 < /dev/null; cat > /dev/null"),
            Some(&mut input as &mut (dyn Read + Send)),
            StdoutMode::Forward,
            Tool::Plotter,
            Stage::Rendering,
            &ctl,
            &diag,
        )
        .unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, WavegramError::Cancelled { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    }

    #[test]
    fn pre_cancelled_token_stops_child() {
        let diag = RecordingDiagnostics::new();
        let token = CancelToken::new();
        token.cancel();
        let ctl = RunControl::unbounded().with_cancel(token);
        let err = run_tool(
            sh("exec sleep 30"),
            None,
            StdoutMode::Forward,
            Tool::Plotter,
            Stage::Rendering,
            &ctl,
            &diag,
        )
        .unwrap_err();
        assert!(matches!(err, WavegramError::Cancelled { .. }));
    }

    #[test]
    fn missing_program_maps_to_stage_error() {
        let diag = RecordingDiagnostics::new();
        let err = run_tool(
            Command::new("/nonexistent/wavegram-tool"),
            None,
            StdoutMode::Forward,
            Tool::Probe,
            Stage::Probing,
            &RunControl::unbounded(),
            &diag,
        )
        .unwrap_err();
        assert!(matches!(err, WavegramError::Probe(_)));
        assert!(err.to_string().contains("failed to spawn"));
    }
}
