//! Export job execution and progress reporting.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::format::ExportFormat;
use super::gif::{gif_step, select_gif_frames, write_gif};
use super::mux::Muxer;
use super::video::{VideoSpec, VideoWriterFactory};
use super::ExportError;
use crate::capture::{Frame, FrameSequence};
use crate::notify::{notify, Notification, Notifier};
use crate::paths::{generate_artifact_path, remove_quietly, video_scratch_dir};

pub const DEFAULT_GIF_FPS: u32 = 10;

/// Share of the job spent writing the intermediate video when audio is muxed.
const INTERMEDIATE_SHARE: usize = 80;

/// Everything one export needs. The frame sequence is a read-only view.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub frames: FrameSequence,
    pub output: PathBuf,
    /// Capture rate the frames were recorded at
    pub fps: u32,
    pub format: ExportFormat,
    pub gif_fps: u32,
    pub audio: Option<PathBuf>,
}

impl ExportJob {
    pub fn new(frames: FrameSequence, output: PathBuf, fps: u32, format: ExportFormat) -> Self {
        Self {
            frames,
            output,
            fps,
            format,
            gif_fps: DEFAULT_GIF_FPS,
            audio: None,
        }
    }

    pub fn with_gif_fps(mut self, gif_fps: u32) -> Self {
        self.gif_fps = gif_fps;
        self
    }

    pub fn with_audio(mut self, audio: Option<PathBuf>) -> Self {
        self.audio = audio;
        self
    }

    /// `<dir>/Rec_<YYYYmmdd_HHMMSS>.<ext>`
    pub fn default_path(dir: &Path, format: ExportFormat) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        dir.join(format!("Rec_{}.{}", stamp, format.extension()))
    }
}

/// Terminal state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Succeeded(PathBuf),
    Failed(String),
}

impl ExportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExportOutcome::Succeeded(_))
    }
}

/// Monotone percentage reporter. Repeated or lower values are swallowed.
struct Progress<'a> {
    notifier: Option<&'a Notifier>,
    last: Option<u8>,
}

impl<'a> Progress<'a> {
    fn new(notifier: Option<&'a Notifier>) -> Self {
        Self {
            notifier,
            last: None,
        }
    }

    fn report(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(tx) = self.notifier {
            notify(tx, Notification::ExportProgress { percent });
        }
    }

    /// `done / total` mapped onto `0..=cap`.
    fn report_fraction(&mut self, done: usize, total: usize, cap: usize) {
        if total == 0 {
            return;
        }
        self.report((done.min(total) * cap / total) as u8);
    }
}

pub struct Exporter {
    writers: Arc<dyn VideoWriterFactory>,
    muxer: Muxer,
    scratch_dir: PathBuf,
}

impl Exporter {
    pub fn new(writers: Arc<dyn VideoWriterFactory>, muxer: Muxer) -> Self {
        Self {
            writers,
            muxer,
            scratch_dir: video_scratch_dir(),
        }
    }

    /// Where intermediate videos go.
    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = dir;
        self
    }

    /// Run a job to its terminal state on the calling thread.
    pub fn run(&self, job: &ExportJob, notifier: Option<&Notifier>) -> ExportOutcome {
        log::info!(
            "Export started: {} frames -> {:?} ({}, audio: {})",
            job.frames.len(),
            job.output,
            job.format,
            job.audio.is_some()
        );

        let mut progress = Progress::new(notifier);
        let outcome = match self.export(job, &mut progress) {
            Ok(path) => {
                progress.report(100);
                log::info!("Export finished: {:?}", path);
                ExportOutcome::Succeeded(path)
            }
            Err(e) => {
                log::error!("Export failed: {}", e);
                ExportOutcome::Failed(e.to_string())
            }
        };

        if let Some(tx) = notifier {
            let (success, message) = match &outcome {
                ExportOutcome::Succeeded(path) => (true, path.display().to_string()),
                ExportOutcome::Failed(reason) => (false, reason.clone()),
            };
            notify(tx, Notification::ExportFinished { success, message });
        }

        outcome
    }

    /// Run a job on its own thread.
    pub fn spawn(
        self: Arc<Self>,
        job: ExportJob,
        notifier: Option<Notifier>,
    ) -> Result<JoinHandle<ExportOutcome>, ExportError> {
        thread::Builder::new()
            .name("export".to_string())
            .spawn(move || self.run(&job, notifier.as_ref()))
            .map_err(|e| ExportError::Io(format!("Failed to start export thread: {}", e)))
    }

    fn export(&self, job: &ExportJob, progress: &mut Progress<'_>) -> Result<PathBuf, ExportError> {
        if job.frames.is_empty() {
            return Err(ExportError::NoFrames);
        }

        if job.format.is_animated_image() {
            if job.audio.is_some() {
                log::info!("GIF export ignores the audio track");
            }
            return self.export_gif(job, progress);
        }

        let audio = match &job.audio {
            Some(path) if path.exists() => Some(path.as_path()),
            Some(path) => {
                log::warn!("Audio artifact {:?} is gone, exporting video only", path);
                None
            }
            None => None,
        };

        match audio {
            Some(audio) => self.export_with_audio(job, audio, progress),
            None => {
                progress.report(0);
                self.write_video(job, &job.output, |done, total| {
                    progress.report_fraction(done, total, 100)
                })?;
                Ok(job.output.clone())
            }
        }
    }

    fn export_gif(&self, job: &ExportJob, progress: &mut Progress<'_>) -> Result<PathBuf, ExportError> {
        if job.gif_fps == 0 {
            return Err(ExportError::InvalidGifFps);
        }

        let step = gif_step(job.fps, job.gif_fps);
        let selected = select_gif_frames(&job.frames, step);
        log::info!(
            "GIF: {} of {} frames (step {}) at {} fps",
            selected.len(),
            job.frames.len(),
            step,
            job.gif_fps
        );

        progress.report(0);
        write_gif(&job.output, &selected, job.gif_fps, |done, total| {
            progress.report_fraction(done, total, 100)
        })?;
        Ok(job.output.clone())
    }

    fn export_with_audio(
        &self,
        job: &ExportJob,
        audio: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<PathBuf, ExportError> {
        let intermediate =
            generate_artifact_path(&self.scratch_dir, "video", job.format.extension())?;

        progress.report(0);
        let written = self.write_video(job, &intermediate, |done, total| {
            progress.report_fraction(done, total, INTERMEDIATE_SHARE)
        });
        if let Err(e) = written {
            remove_quietly(&intermediate);
            return Err(e);
        }

        let codecs = job
            .format
            .mux_codecs()
            .ok_or_else(|| ExportError::Encode(format!("{} cannot carry audio", job.format)))?;

        let result = match self.muxer.run(&intermediate, audio, codecs, &job.output) {
            Ok(()) => Ok(job.output.clone()),
            Err(e) => {
                log::warn!("Mux failed ({}), delivering video without audio", e);
                fs::copy(&intermediate, &job.output)
                    .map(|_| job.output.clone())
                    .map_err(|err| ExportError::Fallback {
                        from: intermediate.clone(),
                        reason: err.to_string(),
                    })
            }
        };

        // The intermediate is kept if even the fallback copy failed
        if result.is_ok() {
            remove_quietly(&intermediate);
            remove_quietly(audio);
        }
        result
    }

    /// Write every frame, in order, through one writer.
    fn write_video(
        &self,
        job: &ExportJob,
        path: &Path,
        mut on_frame: impl FnMut(usize, usize),
    ) -> Result<(), ExportError> {
        let first = job.frames.first().ok_or(ExportError::NoFrames)?;
        let spec = VideoSpec {
            format: job.format,
            fps: job.fps.max(1),
            width: first.width(),
            height: first.height(),
        };

        let mut writer = self.writers.open(&spec, path)?;
        let total = job.frames.len();
        for (i, frame) in job.frames.iter().enumerate() {
            writer.write_frame(&conform(frame, spec.width, spec.height))?;
            on_frame(i + 1, total);
        }
        writer.finish()
    }
}

/// Frames from a reselected region may differ in size from the first one.
pub(super) fn conform(frame: &Frame, width: u32, height: u32) -> Cow<'_, RgbImage> {
    if frame.image.dimensions() == (width, height) {
        Cow::Borrowed(&frame.image)
    } else {
        Cow::Owned(imageops::resize(&frame.image, width, height, FilterType::Triangle))
    }
}
