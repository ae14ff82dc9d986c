//! Recording session: owns the accumulated frames and the audio artifact, and
//! executes the effects produced by `state_machine::reduce`.
//!
//! Effects run synchronously on the caller's thread. The only long waits are
//! the joins of the capture and audio threads when a sub-run stops.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::audio::{AudioCapture, AudioError, AudioOptions};
use crate::capture::{
    list_monitors, CaptureError, FrameScheduler, FrameSequence, SchedulerHandle, ScreenSource,
    XcapScreen,
};
use crate::export::{ExportFormat, ExportJob};
use crate::notify::{notify, Notification, Notifier};
use crate::paths::remove_quietly;
use crate::region::CaptureTarget;
use crate::state_machine::{reduce, Command, Effect, State};

#[derive(Debug, Clone)]
pub enum SessionError {
    InvalidTransition {
        state: &'static str,
        command: &'static str,
    },
    Capture(CaptureError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::InvalidTransition { state, command } => {
                write!(f, "Cannot {} while {}", command, state)
            }
            SessionError::Capture(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CaptureError> for SessionError {
    fn from(e: CaptureError) -> Self {
        SessionError::Capture(e)
    }
}

/// A running audio capture, stopped exactly once.
pub trait AudioRecording: Send {
    /// Stop, wait for the streams to close, and persist the mix.
    fn stop(self: Box<Self>) -> Option<PathBuf>;
}

impl AudioRecording for AudioCapture {
    fn stop(self: Box<Self>) -> Option<PathBuf> {
        AudioCapture::stop(*self)
    }
}

/// Where frames and audio come from. Swapped out in tests.
pub trait CaptureBackend {
    fn open_screen(&self, target: &CaptureTarget) -> Result<Box<dyn ScreenSource>, CaptureError>;

    fn start_audio(&self, options: &AudioOptions) -> Result<Box<dyn AudioRecording>, AudioError>;
}

/// xcap for the screen, cpal for audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl CaptureBackend for NativeBackend {
    fn open_screen(&self, target: &CaptureTarget) -> Result<Box<dyn ScreenSource>, CaptureError> {
        if let CaptureTarget::Monitor(index) = target {
            let count = list_monitors()?.len();
            if *index >= count {
                return Err(CaptureError::MonitorNotFound(format!(
                    "index {} ({} connected)",
                    index, count
                )));
            }
        }
        Ok(Box::new(XcapScreen::new(*target)))
    }

    fn start_audio(&self, options: &AudioOptions) -> Result<Box<dyn AudioRecording>, AudioError> {
        Ok(Box::new(AudioCapture::start(options)?))
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub fps: u32,
    pub record_audio: bool,
    pub audio: AudioOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            record_audio: true,
            audio: AudioOptions::default(),
        }
    }
}

struct ActiveSubRun {
    id: Uuid,
    scheduler: SchedulerHandle,
    audio: Option<Box<dyn AudioRecording>>,
    started_at: Instant,
}

pub struct RecordingSession<B: CaptureBackend = NativeBackend> {
    backend: B,
    config: SessionConfig,
    notifier: Option<Notifier>,
    state: State,
    frames: FrameSequence,
    audio_artifact: Option<PathBuf>,
    active: Option<ActiveSubRun>,
}

impl<B: CaptureBackend> RecordingSession<B> {
    pub fn new(backend: B, config: SessionConfig, notifier: Option<Notifier>) -> Self {
        Self {
            backend,
            config,
            notifier,
            state: State::default(),
            frames: Arc::new(Vec::new()),
            audio_artifact: None,
            active: None,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Takes effect at the next sub-run.
    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    /// Read-only view of every frame merged so far.
    pub fn frames(&self) -> FrameSequence {
        self.frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn audio_artifact(&self) -> Option<&Path> {
        self.audio_artifact.as_deref()
    }

    /// Seconds since the active sub-run started.
    pub fn elapsed_secs(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.started_at.elapsed().as_secs())
    }

    pub fn start(&mut self, target: CaptureTarget) -> Result<(), SessionError> {
        self.dispatch(Command::Start { target })
    }

    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.dispatch(Command::Stop)
    }

    pub fn reselect(&mut self) -> Result<(), SessionError> {
        self.dispatch(Command::Reselect)
    }

    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.dispatch(Command::Reset)
    }

    /// Job for the finished recording, using the session's capture rate.
    pub fn export_job(&self, output: PathBuf, format: ExportFormat, gif_fps: u32) -> ExportJob {
        ExportJob::new(self.frames(), output, self.config.fps, format)
            .with_gif_fps(gif_fps)
            .with_audio(self.audio_artifact.clone())
    }

    pub fn dispatch(&mut self, command: Command) -> Result<(), SessionError> {
        let command_name = command.name();
        let (next, effects) = reduce(&self.state, command);

        if effects.is_empty() {
            log::warn!("Ignoring {} while {}", command_name, self.state.name());
            return Err(SessionError::InvalidTransition {
                state: self.state.name(),
                command: command_name,
            });
        }

        log::debug!("Session: {} -> {} ({:?})", self.state.name(), next.name(), effects);
        let previous = std::mem::replace(&mut self.state, next);

        for effect in effects {
            if let Err(e) = self.run_effect(effect) {
                // Only a start can fail, and nothing was stopped or cleared before it
                self.state = previous;
                return Err(e);
            }
        }
        Ok(())
    }

    fn run_effect(&mut self, effect: Effect) -> Result<(), SessionError> {
        match effect {
            Effect::StartSubRun { id, target, fresh } => {
                if let Err(e) = self.start_sub_run(id, target, fresh) {
                    log::error!("Failed to start capture of {}: {}", target, e);
                    return Err(e);
                }
            }
            Effect::StopSubRun { id } => self.finish_sub_run(id),
            Effect::ClearRecording => self.clear(),
            Effect::EmitStopped => {
                log::info!(
                    "Recording stopped: {} frames, audio: {}",
                    self.frames.len(),
                    self.audio_artifact.is_some()
                );
                if let Some(tx) = &self.notifier {
                    notify(
                        tx,
                        Notification::RecordingStopped {
                            total_frames: self.frames.len() as u64,
                            has_audio: self.audio_artifact.is_some(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn start_sub_run(
        &mut self,
        id: Uuid,
        target: CaptureTarget,
        fresh: bool,
    ) -> Result<(), SessionError> {
        let screen = self.backend.open_screen(&target)?;

        let audio = if self.config.record_audio && self.config.audio.any_source() {
            match self.backend.start_audio(&self.config.audio) {
                Ok(recording) => Some(recording),
                Err(e) => {
                    log::warn!("Recording without audio: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let first_sequence = if fresh {
            0
        } else {
            self.frames.last().map(|f| f.sequence).unwrap_or(0)
        };
        let scheduler = match FrameScheduler::spawn(
            screen,
            self.config.fps,
            first_sequence,
            self.notifier.clone(),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(audio) = audio {
                    if let Some(orphan) = audio.stop() {
                        remove_quietly(&orphan);
                    }
                }
                return Err(e.into());
            }
        };

        if fresh {
            self.clear();
        }

        log::info!("Sub-run {} capturing {}", id, target);
        self.active = Some(ActiveSubRun {
            id,
            scheduler,
            audio,
            started_at: Instant::now(),
        });
        Ok(())
    }

    /// Stop both subsystems, wait for them, and merge their output.
    fn finish_sub_run(&mut self, id: Uuid) {
        let Some(active) = self.active.take() else {
            log::warn!("Stop requested for sub-run {} but none is active", id);
            return;
        };
        if active.id != id {
            log::warn!("Stopping sub-run {} (stop was issued for {})", active.id, id);
        }

        active.scheduler.request_stop();
        let audio_path = active.audio.and_then(|audio| audio.stop());
        let outcome = active.scheduler.stop();

        log::info!(
            "Sub-run {} merged: {} new frames after {:.1}s",
            active.id,
            outcome.frames.len(),
            active.started_at.elapsed().as_secs_f64()
        );
        Arc::make_mut(&mut self.frames).extend(outcome.frames);

        // Only the newest sub-run's audio is kept
        if let Some(previous) = self.audio_artifact.take() {
            if audio_path.as_deref() != Some(previous.as_path()) {
                remove_quietly(&previous);
            }
        }
        self.audio_artifact = audio_path;
    }

    fn clear(&mut self) {
        log::debug!("Clearing {} frames", self.frames.len());
        self.frames = Arc::new(Vec::new());
        if let Some(path) = self.audio_artifact.take() {
            remove_quietly(&path);
        }
    }
}

impl<B: CaptureBackend> Drop for RecordingSession<B> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            log::warn!("Session dropped while capturing, stopping sub-run {}", active.id);
            active.scheduler.request_stop();
            if let Some(audio) = active.audio {
                if let Some(path) = audio.stop() {
                    remove_quietly(&path);
                }
            }
            let _ = active.scheduler.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Solid;

    impl ScreenSource for Solid {
        fn grab(&mut self) -> Result<RgbImage, CaptureError> {
            Ok(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])))
        }
    }

    struct FakeAudio {
        path: PathBuf,
    }

    impl AudioRecording for FakeAudio {
        fn stop(self: Box<Self>) -> Option<PathBuf> {
            std::fs::write(&self.path, b"RIFF").ok()?;
            Some(self.path)
        }
    }

    struct FakeBackend {
        dir: PathBuf,
        audio_runs: AtomicUsize,
        fail_audio: bool,
    }

    impl FakeBackend {
        fn new(dir: &Path) -> Self {
            Self {
                dir: dir.to_path_buf(),
                audio_runs: AtomicUsize::new(0),
                fail_audio: false,
            }
        }
    }

    impl CaptureBackend for FakeBackend {
        fn open_screen(&self, target: &CaptureTarget) -> Result<Box<dyn ScreenSource>, CaptureError> {
            match target {
                CaptureTarget::Monitor(i) if *i > 0 => {
                    Err(CaptureError::MonitorNotFound(format!("index {}", i)))
                }
                _ => Ok(Box::new(Solid)),
            }
        }

        fn start_audio(&self, _: &AudioOptions) -> Result<Box<dyn AudioRecording>, AudioError> {
            if self.fail_audio {
                return Err(AudioError::NoInputDevice);
            }
            let n = self.audio_runs.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeAudio {
                path: self.dir.join(format!("audio-{}.wav", n)),
            }))
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            fps: 50,
            ..SessionConfig::default()
        }
    }

    fn region() -> CaptureTarget {
        CaptureTarget::Region(Region::new(0, 0, 4, 4).unwrap())
    }

    fn record_for(session: &mut RecordingSession<FakeBackend>, ms: u64) {
        session.start(region()).unwrap();
        std::thread::sleep(Duration::from_millis(ms));
    }

    #[test]
    fn stop_merges_frames_and_audio() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = crate::notify::notification_channel();
        let mut session = RecordingSession::new(FakeBackend::new(dir.path()), config(), Some(tx));

        record_for(&mut session, 100);
        session.stop().unwrap();

        assert_eq!(session.state(), &State::Stopped);
        assert!(session.frame_count() > 0);
        assert_eq!(session.audio_artifact(), Some(dir.path().join("audio-0.wav").as_path()));

        let mut stopped = None;
        while let Ok(n) = rx.try_recv() {
            if let Notification::RecordingStopped { total_frames, has_audio } = n {
                stopped = Some((total_frames, has_audio));
            }
        }
        assert_eq!(stopped, Some((session.frame_count() as u64, true)));
    }

    #[test]
    fn reselect_accumulates_and_keeps_latest_audio() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(FakeBackend::new(dir.path()), config(), None);

        record_for(&mut session, 80);
        session.reselect().unwrap();
        let after_first = session.frame_count();
        assert_eq!(session.state(), &State::Idle { paused: true });
        assert!(after_first > 0);

        record_for(&mut session, 80);
        session.stop().unwrap();

        let frames = session.frames();
        assert!(frames.len() > after_first);
        let sequences: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
        let expected: Vec<u64> = (1..=frames.len() as u64).collect();
        assert_eq!(sequences, expected);

        // First sub-run's audio was superseded and deleted
        assert!(!dir.path().join("audio-0.wav").exists());
        assert_eq!(session.audio_artifact(), Some(dir.path().join("audio-1.wav").as_path()));
    }

    #[test]
    fn invalid_commands_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(FakeBackend::new(dir.path()), config(), None);

        assert!(matches!(
            session.stop(),
            Err(SessionError::InvalidTransition { state: "idle", command: "stop" })
        ));

        session.start(region()).unwrap();
        assert!(matches!(
            session.start(region()),
            Err(SessionError::InvalidTransition { .. })
        ));
        session.stop().unwrap();
    }

    #[test]
    fn failed_start_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(FakeBackend::new(dir.path()), config(), None);

        let result = session.start(CaptureTarget::Monitor(3));
        assert!(matches!(result, Err(SessionError::Capture(_))));
        assert_eq!(session.state(), &State::default());
        assert!(session.elapsed_secs().is_none());
    }

    #[test]
    fn failed_start_after_stop_keeps_finished_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(FakeBackend::new(dir.path()), config(), None);

        record_for(&mut session, 60);
        session.stop().unwrap();
        let frames = session.frame_count();
        assert!(frames > 0);

        // Monitor is gone: the unexported recording must survive
        let result = session.start(CaptureTarget::Monitor(3));
        assert!(matches!(result, Err(SessionError::Capture(_))));
        assert_eq!(session.state(), &State::Stopped);
        assert_eq!(session.frame_count(), frames);
        assert!(dir.path().join("audio-0.wav").exists());
        assert_eq!(session.audio_artifact(), Some(dir.path().join("audio-0.wav").as_path()));
    }

    #[test]
    fn failed_reselect_start_stays_paused() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(FakeBackend::new(dir.path()), config(), None);

        record_for(&mut session, 60);
        session.reselect().unwrap();
        let frames = session.frame_count();

        assert!(session.start(CaptureTarget::Monitor(3)).is_err());
        assert_eq!(session.state(), &State::Idle { paused: true });
        assert_eq!(session.frame_count(), frames);
    }

    #[test]
    fn audio_failure_does_not_stop_video() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FakeBackend::new(dir.path());
        backend.fail_audio = true;
        let mut session = RecordingSession::new(backend, config(), None);

        record_for(&mut session, 60);
        session.stop().unwrap();
        assert!(session.frame_count() > 0);
        assert!(session.audio_artifact().is_none());
    }

    #[test]
    fn start_after_stop_discards_previous_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(FakeBackend::new(dir.path()), config(), None);

        record_for(&mut session, 60);
        session.stop().unwrap();
        let kept = session.frames();

        session.start(region()).unwrap();
        assert_eq!(session.frame_count(), 0);
        assert!(!dir.path().join("audio-0.wav").exists());
        session.stop().unwrap();

        // An exporter holding the old view is unaffected
        assert!(!kept.is_empty());
        assert_eq!(kept[0].sequence, 1);
        assert_eq!(session.frames()[0].sequence, 1);
    }

    #[test]
    fn audio_disabled_records_video_only() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new(dir.path());
        let config = SessionConfig {
            record_audio: false,
            ..config()
        };
        let mut session = RecordingSession::new(backend, config, None);

        record_for(&mut session, 40);
        session.stop().unwrap();
        assert!(session.audio_artifact().is_none());
        assert_eq!(session.backend.audio_runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn export_job_carries_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(FakeBackend::new(dir.path()), config(), None);
        record_for(&mut session, 40);
        session.stop().unwrap();

        let job = session.export_job(dir.path().join("out.gif"), ExportFormat::Gif, 10);
        assert_eq!(job.frames.len(), session.frame_count());
        assert_eq!(job.fps, 50);
        assert_eq!(job.gif_fps, 10);
        assert_eq!(job.audio.as_deref(), session.audio_artifact());
    }
}
