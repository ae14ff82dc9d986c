//! Mixing of the captured sources into one stereo stream.
//!
//! Policy: every source is coerced to stereo and brought to a common sample
//! rate, all sources are truncated to the shortest one, then averaged.

use super::buffer::{AudioSource, SourceBuffer};

/// The mixed result: interleaved stereo at a single rate.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedAudio {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl MixedAudio {
    pub const CHANNELS: u16 = 2;

    /// Number of stereo frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / Self::CHANNELS as usize
    }
}

/// Interleaved N-channel samples to interleaved stereo.
///
/// Mono is duplicated into both channels; anything wider keeps its first two.
pub fn to_stereo(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        n => samples
            .chunks_exact(n as usize)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

/// Linear interpolation resampling of interleaved stereo.
pub fn resample_stereo(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == 0 || target_rate == 0 {
        log::warn!(
            "Invalid sample rate (source: {}, target: {}), returning original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    if source_rate == target_rate || samples.len() < 4 {
        return samples.to_vec();
    }

    let in_frames = samples.len() / 2;
    let out_frames =
        ((in_frames as u64 * target_rate as u64) as f64 / source_rate as f64).round() as usize;
    let step = source_rate as f64 / target_rate as f64;
    let last = in_frames - 1;

    let mut out = Vec::with_capacity(out_frames * 2);
    for i in 0..out_frames {
        let pos = i as f64 * step;
        let idx = (pos.floor() as usize).min(last);
        let next = (idx + 1).min(last);
        let frac = (pos - idx as f64) as f32;

        for ch in 0..2 {
            let a = samples[idx * 2 + ch];
            let b = samples[next * 2 + ch];
            out.push(a + (b - a) * frac);
        }
    }
    out
}

/// Mix whatever sources produced data. `None` when there is nothing to mix.
pub fn mix_sources(sources: Vec<SourceBuffer>) -> Option<MixedAudio> {
    if sources.is_empty() {
        return None;
    }

    // The loopback stream's clock wins when present
    let sample_rate = sources
        .iter()
        .find(|s| s.source == AudioSource::System)
        .unwrap_or(&sources[0])
        .sample_rate;

    let parts: Vec<Vec<f32>> = sources
        .iter()
        .map(|s| {
            let stereo = to_stereo(&s.samples, s.channels);
            let aligned = resample_stereo(&stereo, s.sample_rate, sample_rate);
            log::info!(
                "{} audio: {} frames ({} ch @ {} Hz)",
                s.source.as_str(),
                aligned.len() / 2,
                s.channels,
                s.sample_rate
            );
            aligned
        })
        .collect();

    let min_len = parts.iter().map(Vec::len).min().unwrap_or(0);
    if min_len == 0 {
        return None;
    }

    let samples = if parts.len() == 1 {
        parts.into_iter().next().unwrap_or_default()
    } else {
        let count = parts.len() as f32;
        (0..min_len)
            .map(|i| parts.iter().map(|p| p[i]).sum::<f32>() / count)
            .collect()
    };

    Some(MixedAudio {
        sample_rate,
        samples,
    })
}
