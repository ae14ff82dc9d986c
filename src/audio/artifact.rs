//! Mixed audio persistence (hound WAV writer).

use std::path::{Path, PathBuf};

use hound::{WavSpec, WavWriter};

use super::mixer::MixedAudio;
use super::recorder::AudioError;
use crate::paths::{audio_scratch_dir, generate_artifact_path};

/// Write the mix as 16-bit stereo PCM.
pub fn write_wav(path: &Path, mixed: &MixedAudio) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels: MixedAudio::CHANNELS,
        sample_rate: mixed.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        WavWriter::create(path, spec).map_err(|e| AudioError::FileCreationFailed(e.to_string()))?;

    for &sample in &mixed.samples {
        writer
            .write_sample(sample_to_i16(sample))
            .map_err(|e| AudioError::WriteFailed(e.to_string()))?;
    }

    writer
        .finalize()
        .map_err(|e| AudioError::WriteFailed(e.to_string()))
}

/// Save the mix to a fresh scratch file.
///
/// Failure is logged and reported as "no audio"; it never fails the recording.
pub fn persist_mixed(mixed: &MixedAudio, scratch_dir: Option<&Path>) -> Option<PathBuf> {
    let dir = scratch_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(audio_scratch_dir);

    let path = match generate_artifact_path(&dir, "screen_rec_audio", "wav") {
        Ok(p) => p,
        Err(e) => {
            log::error!("Save audio error: cannot create {:?}: {}", dir, e);
            return None;
        }
    };

    match write_wav(&path, mixed) {
        Ok(()) => {
            log::info!(
                "Mixed audio saved: {:?} ({} frames @ {} Hz)",
                path,
                mixed.frames(),
                mixed.sample_rate
            );
            Some(path)
        }
        Err(e) => {
            log::error!("Save audio error: {}", e);
            crate::paths::remove_quietly(&path);
            None
        }
    }
}

/// Convert a float sample to i16 for WAV writing.
fn sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}
