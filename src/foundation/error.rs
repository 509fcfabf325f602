use crate::foundation::diagnostics::Stage;

/// Result alias used across the crate.
pub type WavegramResult<T> = Result<T, WavegramError>;

/// Every way a waveform run can fail.
///
/// Exactly one of these reaches the caller per failed run; it describes the first stage that
/// failed.
#[derive(thiserror::Error, Debug)]
pub enum WavegramError {
    /// Remote download failed (transport, non-success status, or local write).
    #[error("fetch error: {0}")]
    Fetch(String),

    /// No parsable audio stream, or its duration is missing or not finite.
    #[error("probe error: {0}")]
    Probe(String),

    /// The transcode to raw PCM failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// The plotting process failed or produced an unusable image.
    #[error("render error: {message}")]
    Render {
        /// Exit code of the plotter, when it exited with one.
        code: Option<i32>,
        /// Human readable description.
        message: String,
    },

    /// Inputs that can never produce an image (zero width, bad paths, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// The run was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("cancelled while {stage}")]
    Cancelled {
        /// Stage that observed the cancellation.
        stage: Stage,
    },

    /// The run exceeded its deadline.
    #[error("timed out while {stage}")]
    TimedOut {
        /// Stage that observed the deadline.
        stage: Stage,
    },

    /// Filesystem or process plumbing failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Anything else, with context attached.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WavegramError {
    /// Build a [`WavegramError::Fetch`].
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Build a [`WavegramError::Probe`].
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Build a [`WavegramError::Decode`].
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`WavegramError::Render`] without an exit code.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            code: None,
            message: msg.into(),
        }
    }

    /// Build a [`WavegramError::Render`] for a plotter that exited with `code`.
    pub fn render_exit(code: i32) -> Self {
        Self::Render {
            code: Some(code),
            message: format!("plotter exited with code: {code}"),
        }
    }

    /// Build a [`WavegramError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build the stage-specific error for a failure observed while in `stage`.
    pub fn at_stage(stage: Stage, msg: impl Into<String>) -> Self {
        match stage {
            Stage::Resolving => Self::fetch(msg),
            Stage::Probing => Self::probe(msg),
            Stage::Decoding => Self::decode(msg),
            Stage::Rendering => Self::render(msg),
        }
    }

    /// Exit code of a failed plotter run, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Render { code, .. } => *code,
            _ => None,
        }
    }

    /// Stage a stage-specific error belongs to.
    ///
    /// `Io`, `Other` and `Validation` are not tied to a stage by construction; the pipeline
    /// tracks the active stage separately for those.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Fetch(_) => Some(Stage::Resolving),
            Self::Probe(_) => Some(Stage::Probing),
            Self::Decode(_) => Some(Stage::Decoding),
            Self::Render { .. } => Some(Stage::Rendering),
            Self::Cancelled { stage } | Self::TimedOut { stage } => Some(*stage),
            Self::Validation(_) | Self::Io(_) | Self::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(WavegramError::fetch("x").to_string().contains("fetch error:"));
        assert!(WavegramError::probe("x").to_string().contains("probe error:"));
        assert!(
            WavegramError::decode("x")
                .to_string()
                .contains("decode error:")
        );
        assert!(
            WavegramError::render("x")
                .to_string()
                .contains("render error:")
        );
        assert!(
            WavegramError::validation("x")
                .to_string()
                .contains("validation error:")
        );
    }

    #[test]
    fn render_exit_carries_code() {
        let err = WavegramError::render_exit(2);
        assert_eq!(err.exit_code(), Some(2));
        assert!(err.to_string().contains("code: 2"));
        assert_eq!(err.stage(), Some(Stage::Rendering));
    }

    #[test]
    fn stage_tags_match_variants() {
        assert_eq!(WavegramError::fetch("x").stage(), Some(Stage::Resolving));
        assert_eq!(WavegramError::probe("x").stage(), Some(Stage::Probing));
        assert_eq!(WavegramError::decode("x").stage(), Some(Stage::Decoding));
        assert_eq!(
            WavegramError::TimedOut {
                stage: Stage::Decoding
            }
            .stage(),
            Some(Stage::Decoding)
        );
        assert_eq!(WavegramError::validation("x").stage(), None);
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = WavegramError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
