//! Source resolution: local paths pass through, `http(s)` URLs are downloaded into the run
//! workspace.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::foundation::control::RunControl;
use crate::foundation::diagnostics::Stage;
use crate::foundation::error::{WavegramError, WavegramResult};
use crate::workspace::RunWorkspace;

const USER_AGENT: &str = concat!("wavegram/", env!("CARGO_PKG_VERSION"));
const FETCH_CHUNK_BYTES: usize = 64 * 1024;
const FALLBACK_FILE_NAME: &str = "download";

/// A caller-supplied input reference, classified by its scheme prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceRef {
    /// A filesystem path, used as-is.
    Local(PathBuf),
    /// An `http:` or `https:` URL to download first.
    Remote(String),
}

impl SourceRef {
    /// Classify `input`. Anything not starting with `http:` or `https:` is a local path.
    pub fn classify(input: &str) -> Self {
        if input.starts_with("http:") || input.starts_with("https:") {
            Self::Remote(input.to_string())
        } else {
            Self::Local(PathBuf::from(input))
        }
    }

    /// Return `true` for [`SourceRef::Remote`].
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// A local file that later stages can read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedInput {
    /// Local path of the audio data.
    pub path: PathBuf,
    /// `true` when the file was downloaded into the run workspace.
    pub fetched: bool,
}

/// Turn `source` into a local file, downloading into `workspace` when remote.
///
/// Local paths are returned unchanged; later stages report unreadable files.
#[tracing::instrument(skip(workspace, ctl))]
pub fn resolve_input(
    source: &SourceRef,
    workspace: &RunWorkspace,
    ctl: &RunControl,
) -> WavegramResult<ResolvedInput> {
    ctl.check(Stage::Resolving)?;
    match source {
        SourceRef::Local(path) => Ok(ResolvedInput {
            path: path.clone(),
            fetched: false,
        }),
        SourceRef::Remote(url) => {
            let dest = workspace.file(&destination_name(url)?);
            let bytes = fetch_to_file(url, &dest, ctl)?;
            tracing::debug!(url, dest = %dest.display(), bytes, "fetched remote input");
            Ok(ResolvedInput {
                path: dest,
                fetched: true,
            })
        }
    }
}

/// File name a download of `url` is stored under: the last non-empty path segment.
pub fn destination_name(url: &str) -> WavegramResult<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| WavegramError::fetch(format!("invalid URL '{url}': {e}")))?;
    let name = parsed
        .path_segments()
        .and_then(|mut segs| segs.rfind(|s| !s.is_empty()))
        .filter(|s| *s != "." && *s != "..")
        .unwrap_or(FALLBACK_FILE_NAME);
    Ok(name.to_string())
}

fn fetch_to_file(url: &str, dest: &Path, ctl: &RunControl) -> WavegramResult<u64> {
    let mut builder = reqwest::blocking::Client::builder().user_agent(USER_AGENT);
    if let Some(left) = ctl.remaining() {
        builder = builder.timeout(left);
    }
    let client = builder
        .build()
        .map_err(|e| WavegramError::fetch(friendly_network_error(&e)))?;

    let mut response = client.get(url).send().map_err(|e| {
        if e.is_timeout() && ctl.check(Stage::Resolving).is_err() {
            return WavegramError::TimedOut {
                stage: Stage::Resolving,
            };
        }
        WavegramError::fetch(friendly_network_error(&e))
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(WavegramError::fetch(format!("HTTP {status} for {url}")));
    }

    let mut file = File::create(dest).map_err(|e| {
        WavegramError::fetch(format!("failed to create '{}': {e}", dest.display()))
    })?;
    let mut buf = vec![0u8; FETCH_CHUNK_BYTES];
    let mut total = 0u64;
    loop {
        ctl.check(Stage::Resolving)?;
        let n = response.read(&mut buf).map_err(|e| {
            if is_timeout(&e) && ctl.check(Stage::Resolving).is_err() {
                return WavegramError::TimedOut {
                    stage: Stage::Resolving,
                };
            }
            WavegramError::fetch(format!("failed to read body of {url}: {e}"))
        })?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(|e| {
            WavegramError::fetch(format!("failed to write '{}': {e}", dest.display()))
        })?;
        total += n as u64;
    }
    file.flush()
        .map_err(|e| WavegramError::fetch(format!("failed to flush '{}': {e}", dest.display())))?;
    Ok(total)
}

/// Body reads surface reqwest's timeout as an `io::Error`, either by kind or wrapping it.
fn is_timeout(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::TimedOut
        || e.get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
            .is_some_and(reqwest::Error::is_timeout)
}

fn friendly_network_error(e: &reqwest::Error) -> String {
    let target = e
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "remote input".to_string());
    if e.is_builder() {
        return format!("invalid request for {target}: {e}");
    }
    if e.is_connect() {
        return format!("could not connect to {target}: {e}");
    }
    if e.is_timeout() {
        return format!("timed out fetching {target}");
    }
    format!("network error fetching {target}: {e}")
}
