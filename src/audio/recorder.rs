//! Dual-source audio capture using CPAL.
//!
//! `AudioCapture` owns one dedicated thread that opens the system-loopback and
//! microphone streams, keeps them alive until stopped, then drops them. CPAL
//! streams are not `Send` on every platform, so they never leave that thread.
//! Callbacks only convert samples and push them into an unbounded channel.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
    SupportedStreamConfig,
};
use crossbeam_channel::{Receiver, Sender};

use super::artifact::persist_mixed;
use super::buffer::{AudioChunk, AudioSource, SourceBuffer};
use super::devices::{default_microphone, find_loopback_device, LoopbackKind};
use super::mixer::{mix_sources, MixedAudio};

/// Errors that can occur during audio capture.
#[derive(Debug, Clone)]
pub enum AudioError {
    NoInputDevice,
    NoLoopbackDevice,
    NoSupportedConfig,
    DeviceEnumeration(String),
    StreamCreationFailed(String),
    FileCreationFailed(String),
    WriteFailed(String),
    ThreadSpawn(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoLoopbackDevice => write!(f, "No loopback device found for system audio"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::DeviceEnumeration(e) => write!(f, "Failed to enumerate audio devices: {}", e),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            AudioError::FileCreationFailed(e) => write!(f, "Failed to create WAV file: {}", e),
            AudioError::WriteFailed(e) => write!(f, "Failed to write audio data: {}", e),
            AudioError::ThreadSpawn(e) => write!(f, "Failed to start audio thread: {}", e),
        }
    }
}

impl std::error::Error for AudioError {}

/// Which sources to capture and where the mixed artifact goes.
#[derive(Debug, Clone)]
pub struct AudioOptions {
    pub record_system: bool,
    pub record_microphone: bool,
    /// Microphone rate to ask for when the device supports it
    pub preferred_sample_rate: u32,
    /// Directory for the mixed WAV; defaults to the process scratch dir
    pub scratch_dir: Option<PathBuf>,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            record_system: true,
            record_microphone: true,
            preferred_sample_rate: 44100,
            scratch_dir: None,
        }
    }
}

impl AudioOptions {
    pub fn any_source(&self) -> bool {
        self.record_system || self.record_microphone
    }
}

/// A running two-source capture. Stop it to get the mixed artifact.
pub struct AudioCapture {
    recording: Arc<AtomicBool>,
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
    system_rx: Receiver<AudioChunk>,
    mic_rx: Receiver<AudioChunk>,
    scratch_dir: Option<PathBuf>,
}

impl AudioCapture {
    /// Open the requested streams on a new audio thread.
    ///
    /// Unavailable sources are logged and skipped; the capture still starts.
    pub fn start(options: &AudioOptions) -> Result<Self, AudioError> {
        let recording = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<(bool, bool)>(1);
        let (system_tx, system_rx) = crossbeam_channel::unbounded::<AudioChunk>();
        let (mic_tx, mic_rx) = crossbeam_channel::unbounded::<AudioChunk>();

        let opts = options.clone();
        let flag = recording.clone();

        let thread = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let host = cpal::default_host();

                let system_stream = if opts.record_system {
                    open_system_stream(&host, system_tx, flag.clone())
                        .map_err(|e| log::warn!("System audio unavailable: {}", e))
                        .ok()
                } else {
                    None
                };

                let mic_stream = if opts.record_microphone {
                    open_microphone_stream(&host, opts.preferred_sample_rate, mic_tx, flag)
                        .map_err(|e| log::warn!("Microphone unavailable: {}", e))
                        .ok()
                } else {
                    None
                };

                let _ = ready_tx.send((system_stream.is_some(), mic_stream.is_some()));

                // Park until stop; a dropped sender also ends the wait
                let _ = stop_rx.recv();

                drop(system_stream);
                drop(mic_stream);
                log::debug!("Audio streams closed");
            })
            .map_err(|e| AudioError::ThreadSpawn(e.to_string()))?;

        match ready_rx.recv() {
            Ok((system, mic)) => log::info!(
                "Audio capture started (system: {}, microphone: {})",
                system,
                mic
            ),
            Err(_) => log::warn!("Audio thread exited before opening streams"),
        }

        Ok(Self {
            recording,
            stop_tx,
            thread: Some(thread),
            system_rx,
            mic_rx,
            scratch_dir: options.scratch_dir.clone(),
        })
    }

    /// Stop, wait for the streams to close, and mix what was captured.
    pub fn stop_and_mix(mut self) -> Option<MixedAudio> {
        self.quiesce();

        let sources: Vec<SourceBuffer> = [
            SourceBuffer::drain(AudioSource::System, &self.system_rx),
            SourceBuffer::drain(AudioSource::Microphone, &self.mic_rx),
        ]
        .into_iter()
        .flatten()
        .collect();

        mix_sources(sources)
    }

    /// Stop and persist the mix. `None` when there was no audio or it could not be saved.
    pub fn stop(self) -> Option<PathBuf> {
        let scratch_dir = self.scratch_dir.clone();
        let mixed = self.stop_and_mix()?;
        persist_mixed(&mixed, scratch_dir.as_deref())
    }

    fn quiesce(&mut self) {
        self.recording.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Audio capture thread panicked");
            }
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        // Guarantees stream release if the capture is abandoned without stop()
        self.quiesce();
    }
}

fn open_system_stream(
    host: &cpal::Host,
    tx: Sender<AudioChunk>,
    recording: Arc<AtomicBool>,
) -> Result<Stream, AudioError> {
    let (device, kind) = find_loopback_device(host).ok_or(AudioError::NoLoopbackDevice)?;

    let supported = if kind == LoopbackKind::OutputDevice {
        device.default_output_config()
    } else {
        device.default_input_config()
    }
    .map_err(|_| AudioError::NoSupportedConfig)?;

    start_stream(&device, supported, AudioSource::System, tx, recording)
}

fn open_microphone_stream(
    host: &cpal::Host,
    preferred_rate: u32,
    tx: Sender<AudioChunk>,
    recording: Arc<AtomicBool>,
) -> Result<Stream, AudioError> {
    let device = default_microphone(host).ok_or(AudioError::NoInputDevice)?;
    log::info!("Using microphone: {:?}", device.name());

    let supported = pick_input_config(&device, preferred_rate)?;
    start_stream(&device, supported, AudioSource::Microphone, tx, recording)
}

/// Default input config, narrowed to at most two channels at the preferred rate when supported.
fn pick_input_config(device: &Device, preferred_rate: u32) -> Result<SupportedStreamConfig, AudioError> {
    let default = device
        .default_input_config()
        .map_err(|_| AudioError::NoSupportedConfig)?;
    let wanted_channels = default.channels().clamp(1, 2);

    if let Ok(ranges) = device.supported_input_configs() {
        for range in ranges {
            if range.channels() == wanted_channels
                && range.sample_format() == default.sample_format()
                && range.min_sample_rate().0 <= preferred_rate
                && preferred_rate <= range.max_sample_rate().0
            {
                return Ok(range.with_sample_rate(cpal::SampleRate(preferred_rate)));
            }
        }
    }

    Ok(default)
}

fn start_stream(
    device: &Device,
    supported: SupportedStreamConfig,
    source: AudioSource,
    tx: Sender<AudioChunk>,
    recording: Arc<AtomicBool>,
) -> Result<Stream, AudioError> {
    log::info!(
        "{} audio config: {} Hz, {} channels, {:?}",
        source.as_str(),
        supported.sample_rate().0,
        supported.channels(),
        supported.sample_format()
    );

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    let stream = match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(device, &config, source, tx, recording),
        SampleFormat::U16 => build_stream_typed::<u16>(device, &config, source, tx, recording),
        SampleFormat::I32 => build_stream_typed::<i32>(device, &config, source, tx, recording),
        SampleFormat::F32 => build_stream_typed::<f32>(device, &config, source, tx, recording),
        _ => Err(AudioError::NoSupportedConfig),
    }?;

    stream.play().map_err(|e| {
        AudioError::StreamCreationFailed(format!("Failed to start stream: {}", e))
    })?;

    Ok(stream)
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    source: AudioSource,
    tx: Sender<AudioChunk>,
    recording: Arc<AtomicBool>,
) -> Result<Stream, AudioError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels;
    let sample_rate = config.sample_rate.0;
    let err_fn = move |err| log::error!("{} audio stream error: {}", source.as_str(), err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !recording.load(Ordering::SeqCst) {
                    return;
                }
                let chunk = AudioChunk {
                    source,
                    channels,
                    sample_rate,
                    samples: data.iter().map(|&s| f32::from_sample(s)).collect(),
                };
                // Unbounded: never blocks the audio callback
                let _ = tx.send(chunk);
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))
}
