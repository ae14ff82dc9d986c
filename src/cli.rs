//! Command-line front end.

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::list_audio_devices;
use crate::capture::{list_monitors, SUPPORTED_FPS};
use crate::export::{ExportFormat, ExportJob, ExportOutcome, Exporter, FfmpegWriterFactory, Muxer};
use crate::ffmpeg::locate_ffmpeg;
use crate::notify::{format_elapsed, notification_channel, Notification, NotificationReceiver};
use crate::region::{CaptureTarget, Region};
use crate::session::{NativeBackend, RecordingSession, SessionConfig};
use crate::settings::{load_settings, save_settings, AppSettings};

#[derive(Parser)]
#[command(name = "screenrec")]
#[command(about = "Record a screen region with system and microphone audio, export to video or GIF")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record, then export
    Record(RecordArgs),

    /// List connected monitors
    Monitors {
        #[arg(long)]
        json: bool,
    },

    /// List audio input devices (loopback candidates are marked)
    AudioDevices {
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct RecordArgs {
    /// Region as LEFT,TOP,WIDTH,HEIGHT. Repeat to reselect mid-recording.
    #[arg(short, long, value_name = "L,T,W,H", allow_hyphen_values = true)]
    region: Vec<Region>,

    /// Record a whole monitor instead of a region
    #[arg(short, long, conflicts_with = "region")]
    monitor: Option<usize>,

    /// Seconds per region. Without it, Ctrl+C moves on to the next region.
    #[arg(short, long, value_name = "SECS")]
    duration: Option<u64>,

    /// Capture rate (15, 24, 30 or 60)
    #[arg(long, value_parser = parse_fps)]
    fps: Option<u32>,

    /// mp4, avi, webm or gif
    #[arg(short, long)]
    format: Option<ExportFormat>,

    #[arg(long)]
    gif_fps: Option<u32>,

    /// Output file. Defaults to Rec_<timestamp>.<ext> in the output directory.
    /// The extension is always set to match the format.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    no_audio: bool,

    #[arg(long)]
    no_system_audio: bool,

    #[arg(long)]
    no_microphone: bool,

    /// ffmpeg binary to use
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Remember these options as the new defaults
    #[arg(long)]
    save_defaults: bool,
}

fn parse_fps(value: &str) -> Result<u32, String> {
    let fps: u32 = value.parse().map_err(|_| format!("not a number: {}", value))?;
    if SUPPORTED_FPS.contains(&fps) {
        Ok(fps)
    } else {
        Err(format!("unsupported rate {}, choose one of {:?}", fps, SUPPORTED_FPS))
    }
}

impl RecordArgs {
    fn apply(&self, settings: &mut AppSettings) {
        if let Some(fps) = self.fps {
            settings.capture_fps = fps;
        }
        if let Some(format) = self.format {
            settings.export_format = format;
        }
        if let Some(gif_fps) = self.gif_fps {
            settings.gif_fps = gif_fps;
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            settings.ffmpeg_path = Some(ffmpeg.clone());
        }
        settings.record_audio &= !self.no_audio;
        settings.record_system_audio &= !self.no_system_audio;
        settings.record_microphone &= !self.no_microphone;
    }

    fn output_path(&self, settings: &AppSettings) -> PathBuf {
        let format = settings.export_format;
        match &self.output {
            Some(path) => with_format_extension(path, format),
            None => ExportJob::default_path(&settings.resolved_output_dir(), format),
        }
    }

    fn targets(&self) -> Vec<CaptureTarget> {
        if self.region.is_empty() {
            vec![CaptureTarget::Monitor(self.monitor.unwrap_or(0))]
        } else {
            self.region.iter().copied().map(CaptureTarget::Region).collect()
        }
    }
}

/// ffmpeg picks the container from the extension, so it has to match.
fn with_format_extension(path: &Path, format: ExportFormat) -> PathBuf {
    let matches = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(format.extension()));
    if matches {
        return path.to_path_buf();
    }
    let fixed = path.with_extension(format.extension());
    log::warn!("Output {:?} does not match {}, writing {:?}", path, format, fixed);
    fixed
}

pub fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Record(args) => record(args),
        Commands::Monitors { json } => monitors(json),
        Commands::AudioDevices { json } => audio_devices(json),
    }
}

fn monitors(json: bool) -> Result<(), String> {
    let monitors = list_monitors().map_err(|e| e.to_string())?;
    if json {
        let text = serde_json::to_string_pretty(&monitors).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }
    for m in monitors {
        println!(
            "{}: {} {}x{} at ({}, {}){}",
            m.index,
            m.name,
            m.width,
            m.height,
            m.x,
            m.y,
            if m.is_primary { " [primary]" } else { "" }
        );
    }
    Ok(())
}

fn audio_devices(json: bool) -> Result<(), String> {
    let devices = list_audio_devices().map_err(|e| e.to_string())?;
    if json {
        let text = serde_json::to_string_pretty(&devices).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }
    for d in devices {
        let mut tags = Vec::new();
        if d.is_default_input {
            tags.push("default");
        }
        if d.is_loopback {
            tags.push("loopback");
        }
        let format = match (d.channels, d.sample_rate) {
            (Some(ch), Some(rate)) => format!(" {} ch @ {} Hz", ch, rate),
            _ => String::new(),
        };
        println!("{}{} [{}]", d.name, format, tags.join(", "));
    }
    Ok(())
}

fn record(args: RecordArgs) -> Result<(), String> {
    let mut settings = load_settings();
    args.apply(&mut settings);
    if args.save_defaults {
        match save_settings(&settings) {
            Ok(()) => log::info!("Saved options as defaults"),
            Err(e) => log::warn!("Could not save defaults: {}", e),
        }
    }

    let format = settings.export_format;
    let output = args.output_path(&settings);

    let (tx, rx) = notification_channel();
    let printer = spawn_printer(rx, settings.capture_fps)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .map_err(|e| format!("Failed to install Ctrl+C handler: {}", e))?;

    let config = SessionConfig {
        fps: settings.capture_fps,
        record_audio: settings.record_audio,
        audio: crate::audio::AudioOptions {
            record_system: settings.record_system_audio,
            record_microphone: settings.record_microphone,
            preferred_sample_rate: settings.preferred_sample_rate,
            scratch_dir: None,
        },
    };
    let mut session = RecordingSession::new(NativeBackend, config, Some(tx.clone()));

    let targets = args.targets();
    for (i, target) in targets.iter().enumerate() {
        if i > 0 {
            session.reselect().map_err(|e| e.to_string())?;
        }
        eprintln!("\nRecording {} ({})", target, segment_hint(args.duration));
        if let Err(e) = session.start(*target) {
            if i == 0 {
                return Err(e.to_string());
            }
            // Keep what the earlier regions captured
            eprintln!("\nSkipping {}: {}", target, e);
            break;
        }
        wait_segment(args.duration, &interrupted);
    }
    session.stop().map_err(|e| e.to_string())?;

    let ffmpeg = locate_ffmpeg(settings.ffmpeg_path.as_deref()).unwrap_or_else(|| PathBuf::from("ffmpeg"));
    let exporter = Arc::new(Exporter::new(
        Arc::new(FfmpegWriterFactory::new(ffmpeg.clone())),
        Muxer::new(ffmpeg, Duration::from_secs(settings.mux_timeout_secs)),
    ));

    let job = session.export_job(output, format, settings.gif_fps);
    // Dropping the session releases its notifier so the printer can finish
    drop(session);

    let handle = exporter.spawn(job, Some(tx)).map_err(|e| e.to_string())?;
    let outcome = handle
        .join()
        .unwrap_or_else(|_| ExportOutcome::Failed("export thread panicked".to_string()));
    let _ = printer.join();

    match outcome {
        ExportOutcome::Succeeded(path) => {
            println!("Saved: {}", path.display());
            Ok(())
        }
        ExportOutcome::Failed(reason) => Err(format!("Export failed: {}", reason)),
    }
}

fn segment_hint(duration: Option<u64>) -> String {
    match duration {
        Some(secs) => format!("{}s, Ctrl+C to skip", secs),
        None => "Ctrl+C to stop".to_string(),
    }
}

/// Block until the segment's time is up or Ctrl+C was pressed.
fn wait_segment(duration: Option<u64>, interrupted: &AtomicBool) {
    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        if interrupted.swap(false, Ordering::SeqCst) {
            return;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

/// Render notifications on stderr until every sender is gone.
fn spawn_printer(mut rx: NotificationReceiver, fps: u32) -> Result<JoinHandle<()>, String> {
    thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let started = Instant::now();
            let every = u64::from(fps.max(1));
            while let Some(notification) = rx.blocking_recv() {
                match notification {
                    Notification::FrameCaptured { total_frames } => {
                        if total_frames == 1 || total_frames % every == 0 {
                            eprint!(
                                "\r● REC {}  {} frames",
                                format_elapsed(started.elapsed().as_secs()),
                                total_frames
                            );
                        }
                    }
                    Notification::RecordingStopped {
                        total_frames,
                        has_audio,
                    } => {
                        eprintln!(
                            "\nStopped: {} frames{}",
                            total_frames,
                            if has_audio { " + audio" } else { "" }
                        );
                    }
                    Notification::ExportProgress { percent } => {
                        eprint!("\rExporting... {:>3}%", percent);
                    }
                    Notification::ExportFinished { success, message } => {
                        eprintln!();
                        if !success {
                            eprintln!("Export error: {}", message);
                        }
                    }
                }
                let _ = io::stderr().flush();
            }
        })
        .map_err(|e| format!("Failed to start progress thread: {}", e))
}
