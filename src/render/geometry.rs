use std::path::Path;

use crate::config::{IMAGE_HEIGHT, PIXELS_PER_SECOND};
use crate::foundation::error::{WavegramError, WavegramResult};

/// Image width for a clip of `duration_secs`: `round(duration_secs * 100)`.
///
/// Rounds half away from zero, which for the non-negative inputs accepted here is the same as
/// rounding half up. A width of zero cannot be rendered and is rejected.
pub fn image_width_for(duration_secs: f64) -> WavegramResult<u32> {
    if !duration_secs.is_finite() || duration_secs < 0.0 {
        return Err(WavegramError::validation(format!(
            "duration must be a finite non-negative number of seconds, got {duration_secs}"
        )));
    }
    let width = (duration_secs * f64::from(PIXELS_PER_SECOND)).round();
    if width < 1.0 {
        return Err(WavegramError::validation(format!(
            "audio is too short to render ({duration_secs}s rounds to a zero-width image)"
        )));
    }
    if width > f64::from(u32::MAX) {
        return Err(WavegramError::validation(format!(
            "audio is too long to render ({duration_secs}s)"
        )));
    }
    Ok(width as u32)
}

/// Check that `path` holds an image of `width` x [`IMAGE_HEIGHT`].
pub fn verify_image(path: &Path, width: u32) -> WavegramResult<()> {
    let (w, h) = image::image_dimensions(path).map_err(|e| {
        WavegramError::render(format!(
            "plotter did not produce a readable image at '{}': {e}",
            path.display()
        ))
    })?;
    if (w, h) != (width, IMAGE_HEIGHT) {
        return Err(WavegramError::render(format!(
            "'{}' is {w}x{h}, expected {width}x{IMAGE_HEIGHT}",
            path.display()
        )));
    }
    Ok(())
}
