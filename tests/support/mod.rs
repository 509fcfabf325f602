#![allow(dead_code)]

use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use wavegram::Toolchain;

/// Write a mono 16-bit PCM WAV of `duration_ms` silence (or a tone when `tone_hz` is set).
///
/// Fixtures are synthesised at test time so no binary assets live in the repository.
pub fn write_wav(
    path: &Path,
    sample_rate: u32,
    duration_ms: u64,
    tone_hz: Option<f32>,
) -> Result<(), Box<dyn Error>> {
    let total_samples = sample_rate as u64 * duration_ms / 1_000;
    let mut samples = Vec::with_capacity(total_samples as usize * 2);
    for n in 0..total_samples {
        let sample = match tone_hz {
            Some(hz) => {
                let theta = (n as f32 / sample_rate as f32) * 2.0 * std::f32::consts::PI * hz;
                (theta.sin() * i16::MAX as f32 * 0.8) as i16
            }
            None => 0,
        };
        samples.extend_from_slice(&sample.to_le_bytes());
    }

    let mut file = File::create(path)?;
    let data_len = samples.len() as u32;
    file.write_all(b"RIFF")?;
    file.write_all(&(36u32 + data_len).to_le_bytes())?;
    file.write_all(b"WAVE")?;
    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?;
    file.write_all(&sample_rate.to_le_bytes())?;
    file.write_all(&(sample_rate * 2).to_le_bytes())?;
    file.write_all(&2u16.to_le_bytes())?;
    file.write_all(&16u16.to_le_bytes())?;
    file.write_all(b"data")?;
    file.write_all(&data_len.to_le_bytes())?;
    file.write_all(&samples)?;
    Ok(())
}

/// Real toolchain, or `None` when any of `ffmpeg`/`ffprobe`/`gnuplot` is missing.
pub fn real_toolchain() -> Option<Toolchain> {
    let tc = Toolchain::detect();
    (tc.media_tools_available() && tc.plotter_available()).then_some(tc)
}

/// Write an executable `sh` script called `name` into `dir`.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt as _;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// `ffprobe` stand-in that reports one audio stream of `duration`.
#[cfg(unix)]
pub fn fake_ffprobe(dir: &Path, duration: &str) -> PathBuf {
    fake_tool(
        dir,
        "ffprobe",
        &format!(
            "echo '{{\"streams\":[{{\"codec_type\":\"audio\",\"duration\":\"{duration}\"}}]}}'"
        ),
    )
}

/// `ffmpeg` stand-in that writes 4000 samples to its last argument and echoes that path.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    fake_tool(
        dir,
        "ffmpeg",
        "for last; do :; done\nhead -c 8000 /dev/zero > \"$last\"\necho \"$last\"",
    )
}

/// Plotter stand-in that drains stdin, copies `png` to `output` and exits 0.
#[cfg(unix)]
pub fn fake_gnuplot(dir: &Path, png: &Path, output: &Path) -> PathBuf {
    fake_tool(
        dir,
        "gnuplot",
        &format!(
            "cat > /dev/null\ncp '{}' '{}'",
            png.display(),
            output.display()
        ),
    )
}

/// A transparent PNG of `width` x 100, the shape gnuplot would produce.
pub fn blank_png(path: &Path, width: u32) {
    image::RgbaImage::new(width, wavegram::IMAGE_HEIGHT)
        .save(path)
        .unwrap();
}
