//! Audio capture module
//!
//! Captures system output (loopback) and microphone audio concurrently and
//! mixes them into one stereo WAV when the capture stops.
//! Uses CPAL for capture and hound for WAV encoding.

mod artifact;
mod buffer;
mod devices;
mod mixer;
pub mod recorder;

pub use artifact::{persist_mixed, write_wav};
pub use buffer::{AudioChunk, AudioSource, SourceBuffer};
pub use devices::{is_loopback_name, list_audio_devices, pick_loopback, AudioDeviceInfo, LoopbackKind};
pub use mixer::{mix_sources, resample_stereo, to_stereo, MixedAudio};
pub use recorder::{AudioCapture, AudioError, AudioOptions};
