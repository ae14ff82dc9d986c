//! Animated GIF path: temporal downsampling, width cap, in-process encoding.

use std::borrow::Cow;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, DynamicImage, RgbImage};

use super::job::conform;
use super::ExportError;
use crate::capture::Frame;

/// Frames wider than this are scaled down before encoding.
pub const GIF_MAX_WIDTH: u32 = 1000;

/// NeuQuant speed; 1 is best quality and very slow, 30 is fastest.
const QUANTIZE_SPEED: i32 = 10;

/// Keep every n-th captured frame so that the GIF plays at roughly `gif_fps`.
pub fn gif_step(capture_fps: u32, gif_fps: u32) -> usize {
    if gif_fps == 0 {
        return 1;
    }
    ((capture_fps / gif_fps) as usize).max(1)
}

pub fn select_gif_frames(frames: &[Frame], step: usize) -> Vec<&Frame> {
    frames.iter().step_by(step.max(1)).collect()
}

/// Proportionally shrink images wider than `GIF_MAX_WIDTH`; others pass through.
pub fn downscale_for_gif(image: &RgbImage) -> Cow<'_, RgbImage> {
    let (width, height) = image.dimensions();
    if width <= GIF_MAX_WIDTH {
        return Cow::Borrowed(image);
    }

    let scale = GIF_MAX_WIDTH as f64 / width as f64;
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    Cow::Owned(imageops::resize(image, GIF_MAX_WIDTH, new_height, FilterType::Triangle))
}

/// Encode `frames` as a looping GIF. `progress(done, total)` fires after each frame.
///
/// The first frame fixes the canvas size; later frames of a different size
/// (from a reselected region) are resized to it.
pub fn write_gif(
    path: &Path,
    frames: &[&Frame],
    gif_fps: u32,
    mut progress: impl FnMut(usize, usize),
) -> Result<(), ExportError> {
    if gif_fps == 0 {
        return Err(ExportError::InvalidGifFps);
    }

    let file = File::create(path)?;
    let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), QUANTIZE_SPEED);
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| ExportError::Encode(e.to_string()))?;

    let delay = Delay::from_numer_denom_ms(1000, gif_fps);
    let total = frames.len();
    let canvas = frames.first().map(|f| f.image.dimensions()).unwrap_or((0, 0));

    for (i, frame) in frames.iter().enumerate() {
        let conformed = conform(frame, canvas.0, canvas.1);
        let scaled = downscale_for_gif(&conformed).into_owned();
        let rgba = DynamicImage::ImageRgb8(scaled).into_rgba8();
        encoder
            .encode_frame(image::Frame::from_parts(rgba, 0, 0, delay))
            .map_err(|e| ExportError::Encode(e.to_string()))?;
        progress(i + 1, total);
    }

    Ok(())
}
