pub mod audio;
pub mod capture;
pub mod cli;
pub mod export;
pub mod ffmpeg;
pub mod notify;
pub mod paths;
pub mod region;
pub mod session;
pub mod settings;
pub mod state_machine;

use clap::Parser;
use std::process::ExitCode;

pub use capture::{Frame, FrameSequence};
pub use export::{ExportFormat, ExportJob, ExportOutcome, Exporter};
pub use notify::Notification;
pub use region::{CaptureTarget, Region};
pub use session::{CaptureBackend, NativeBackend, RecordingSession, SessionConfig, SessionError};
pub use settings::AppSettings;

/// Entry point of the `screenrec` binary.
pub fn run() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("screenrec {} starting", env!("CARGO_PKG_VERSION"));

    // Leftovers from crashed runs
    for dir in [paths::audio_scratch_dir(), paths::video_scratch_dir()] {
        match paths::cleanup_old_artifacts(&dir) {
            Ok(0) => {}
            Ok(n) => log::info!("Cleaned up {} old file(s) in {:?}", n, dir),
            Err(e) => log::warn!("Failed to clean up {:?}: {}", dir, e),
        }
    }

    match cli::run(cli::Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
