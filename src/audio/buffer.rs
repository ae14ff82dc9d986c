//! Per-source chunk collection
//!
//! Stream callbacks push `AudioChunk`s into an unbounded channel. Only after the
//! capture thread has been joined are the channels drained into `SourceBuffer`s,
//! so no chunk delivered after stop can reach the mixer.

use crossbeam_channel::Receiver;

/// Which native stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioSource {
    /// Output loopback (what the speakers play)
    System,
    Microphone,
}

impl AudioSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioSource::System => "system",
            AudioSource::Microphone => "microphone",
        }
    }
}

/// A block of interleaved samples as delivered by one callback.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub source: AudioSource,
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// All samples of one source, concatenated in arrival order.
#[derive(Debug, Clone)]
pub struct SourceBuffer {
    pub source: AudioSource,
    pub channels: u16,
    pub sample_rate: u32,
    /// Interleaved samples
    pub samples: Vec<f32>,
}

impl SourceBuffer {
    /// Concatenate chunks. Returns `None` when the source delivered nothing.
    ///
    /// The format of the first chunk is authoritative; chunks that disagree
    /// with it are dropped since format cannot change within one run.
    pub fn from_chunks(source: AudioSource, chunks: impl IntoIterator<Item = AudioChunk>) -> Option<Self> {
        let mut buffer: Option<SourceBuffer> = None;
        let mut dropped = 0usize;

        for chunk in chunks {
            match buffer.as_mut() {
                None => {
                    buffer = Some(SourceBuffer {
                        source,
                        channels: chunk.channels,
                        sample_rate: chunk.sample_rate,
                        samples: chunk.samples,
                    });
                }
                Some(b) if b.channels == chunk.channels && b.sample_rate == chunk.sample_rate => {
                    b.samples.extend_from_slice(&chunk.samples);
                }
                Some(_) => dropped += 1,
            }
        }

        if dropped > 0 {
            log::warn!(
                "Dropped {} {} audio chunk(s) with a changed format",
                dropped,
                source.as_str()
            );
        }

        buffer.filter(|b| b.channels > 0 && !b.samples.is_empty())
    }

    /// Drain whatever is queued on a receiver. Call only after the producer stopped.
    pub fn drain(source: AudioSource, rx: &Receiver<AudioChunk>) -> Option<Self> {
        Self::from_chunks(source, rx.try_iter())
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames() as u64 * 1000) / self.sample_rate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(channels: u16, rate: u32, samples: Vec<f32>) -> AudioChunk {
        AudioChunk {
            source: AudioSource::Microphone,
            channels,
            sample_rate: rate,
            samples,
        }
    }

    #[test]
    fn concatenates_in_arrival_order() {
        let buffer = SourceBuffer::from_chunks(
            AudioSource::Microphone,
            vec![
                chunk(1, 48000, vec![0.1, 0.2]),
                chunk(1, 48000, vec![0.3]),
                chunk(1, 48000, vec![0.4, 0.5]),
            ],
        )
        .unwrap();

        assert_eq!(buffer.samples, vec![0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!(buffer.frames(), 5);
    }

    #[test]
    fn empty_source_yields_none() {
        assert!(SourceBuffer::from_chunks(AudioSource::System, Vec::new()).is_none());
        assert!(SourceBuffer::from_chunks(AudioSource::System, vec![chunk(2, 48000, vec![])]).is_none());
    }

    #[test]
    fn format_change_mid_run_is_dropped() {
        let buffer = SourceBuffer::from_chunks(
            AudioSource::System,
            vec![
                chunk(2, 48000, vec![0.1, 0.1]),
                chunk(1, 44100, vec![0.9]),
                chunk(2, 48000, vec![0.2, 0.2]),
            ],
        )
        .unwrap();

        assert_eq!(buffer.channels, 2);
        assert_eq!(buffer.samples, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn drain_reads_queued_chunks() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(chunk(2, 1000, vec![0.0; 2000])).unwrap();
        tx.send(chunk(2, 1000, vec![0.0; 2000])).unwrap();
        drop(tx);

        let buffer = SourceBuffer::drain(AudioSource::Microphone, &rx).unwrap();
        assert_eq!(buffer.frames(), 2000);
        assert_eq!(buffer.duration_ms(), 2000);
        assert!(rx.try_recv().is_err());
    }
}
