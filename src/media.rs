//! `ffprobe`/`ffmpeg` collaborators: duration extraction and PCM transcoding.

/// Transcode to the raw mono PCM stream the plotter reads.
pub mod decode;
/// Duration extraction.
pub mod probe;
