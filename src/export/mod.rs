//! Export of a finished recording to a video or GIF file.
//!
//! Raster formats are encoded by an ffmpeg child process fed raw frames over a
//! pipe. GIF is encoded in-process with `image`. When an audio artifact is
//! present the video goes to a scratch file first and a second ffmpeg run muxes
//! it with the audio; if that fails the video-only file is delivered instead.

mod format;
mod gif;
mod job;
mod mux;
mod video;

pub use format::{DirectCodec, ExportFormat};
pub use gif::{downscale_for_gif, gif_step, select_gif_frames, write_gif, GIF_MAX_WIDTH};
pub use job::{ExportJob, ExportOutcome, Exporter, DEFAULT_GIF_FPS};
pub use mux::{MuxError, Muxer, DEFAULT_MUX_TIMEOUT};
pub use video::{FfmpegWriterFactory, VideoSpec, VideoWriter, VideoWriterFactory};

use std::path::PathBuf;

/// Errors that fail an export job.
#[derive(Debug, Clone)]
pub enum ExportError {
    NoFrames,
    InvalidGifFps,
    /// The encoder process could not be started
    EncoderLaunch(String),
    EncoderFailed(String),
    Encode(String),
    Io(String),
    /// Fallback copy of the video-only file failed
    Fallback { from: PathBuf, reason: String },
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::NoFrames => write!(f, "no frames recorded"),
            ExportError::InvalidGifFps => write!(f, "GIF frame rate must be at least 1"),
            ExportError::EncoderLaunch(e) => write!(f, "Failed to start video encoder: {}", e),
            ExportError::EncoderFailed(e) => write!(f, "Video encoder failed: {}", e),
            ExportError::Encode(e) => write!(f, "Encoding failed: {}", e),
            ExportError::Io(e) => write!(f, "I/O error: {}", e),
            ExportError::Fallback { from, reason } => {
                write!(f, "Could not deliver video-only file {:?}: {}", from, reason)
            }
        }
    }
}

impl std::error::Error for ExportError {}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e.to_string())
    }
}
