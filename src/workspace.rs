use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::WavegramResult;

const WORKSPACE_PREFIX: &str = "wavegram-";
const SAMPLES_FILE: &str = "samples.pcm";

/// Per-run scratch directory.
///
/// Holds the fetched input (for remote sources) and the intermediate PCM file. The directory
/// and everything in it is removed when the workspace is dropped, on success and on every
/// failure path alike. Each run gets its own directory, so concurrent runs never share names.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: tempfile::TempDir,
}

impl RunWorkspace {
    /// Create a fresh directory under the system temp dir.
    pub fn create() -> WavegramResult<Self> {
        Self::create_in(std::env::temp_dir())
    }

    /// Create a fresh directory under `parent`.
    pub fn create_in(parent: impl AsRef<Path>) -> WavegramResult<Self> {
        let parent = parent.as_ref();
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(parent)
            .with_context(|| {
                format!("failed to create run workspace in '{}'", parent.display())
            })?;
        tracing::debug!(path = %dir.path().display(), "created run workspace");
        Ok(Self { dir })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Unique name of this workspace's directory.
    pub fn id(&self) -> String {
        self.dir
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Where the decoder writes raw samples for this run.
    pub fn samples_path(&self) -> PathBuf {
        self.dir.path().join(SAMPLES_FILE)
    }

    /// Path for a file named `name` inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_removed_on_drop() {
        let ws = RunWorkspace::create().unwrap();
        let path = ws.path().to_path_buf();
        std::fs::write(ws.samples_path(), [0u8, 1, 2, 3]).unwrap();
        assert!(path.is_dir());

        drop(ws);
        assert!(!path.exists());
    }

    #[test]
    fn workspaces_never_share_a_directory() {
        let a = RunWorkspace::create().unwrap();
        let b = RunWorkspace::create().unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.samples_path(), b.samples_path());
        assert!(a.id().starts_with(WORKSPACE_PREFIX));
    }

    #[test]
    fn concurrent_creation_yields_distinct_ids() {
        let ids: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let ws = RunWorkspace::create().unwrap();
                        let id = ws.id();
                        // Hold the directory until every thread has created its own.
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        id
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let unique: std::collections::BTreeSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn file_joins_inside_workspace() {
        let ws = RunWorkspace::create().unwrap();
        assert_eq!(ws.file("clip.mp3").parent(), Some(ws.path()));
    }
}
