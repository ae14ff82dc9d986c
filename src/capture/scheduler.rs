//! Paced capture loop.
//!
//! One thread per sub-run. Each tick grabs a frame, then sleeps for whatever is
//! left of `1/fps`. Slow ticks are not compensated: no frames are dropped and no
//! catch-up frames are synthesized, so the achieved rate may fall below `fps`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::frame::Frame;
use super::screen::{CaptureError, ScreenSource};
use crate::notify::{notify, Notification, Notifier};

/// Capture rates offered to the user.
pub const SUPPORTED_FPS: [u32; 4] = [30, 60, 24, 15];

/// Only log the first few consecutive-ish failures, then every Nth.
const FAILURE_LOG_EVERY: u64 = 100;

pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

/// What a finished capture loop hands back.
#[derive(Debug, Default)]
pub struct CaptureOutcome {
    pub frames: Vec<Frame>,
    pub failed_ticks: u64,
    pub elapsed: Duration,
}

impl CaptureOutcome {
    pub fn achieved_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames.len() as f64 / secs
        } else {
            0.0
        }
    }
}

pub struct FrameScheduler;

impl FrameScheduler {
    /// Start capturing on a dedicated thread.
    ///
    /// `first_sequence` is the number of frames already held by the recording;
    /// the first frame of this run gets `first_sequence + 1`.
    pub fn spawn(
        mut source: Box<dyn ScreenSource>,
        fps: u32,
        first_sequence: u64,
        notifier: Option<Notifier>,
    ) -> Result<SchedulerHandle, CaptureError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let interval = frame_interval(fps);

        log::info!(
            "Frame capture starting at {} fps (interval {:?}), sequence offset {}",
            fps,
            interval,
            first_sequence
        );

        let thread = thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || {
                run_capture_loop(
                    source.as_mut(),
                    interval,
                    first_sequence,
                    &stop_flag,
                    notifier.as_ref(),
                )
            })
            .map_err(|e| CaptureError::ThreadSpawn(e.to_string()))?;

        Ok(SchedulerHandle { stop, thread })
    }
}

fn run_capture_loop(
    source: &mut dyn ScreenSource,
    interval: Duration,
    first_sequence: u64,
    stop: &AtomicBool,
    notifier: Option<&Notifier>,
) -> CaptureOutcome {
    let started = Instant::now();
    let mut frames = Vec::new();
    let mut sequence = first_sequence;
    let mut failed_ticks: u64 = 0;

    while !stop.load(Ordering::SeqCst) {
        let tick = Instant::now();

        match source.grab() {
            Ok(image) => {
                sequence += 1;
                frames.push(Frame::new(sequence, image));
                if let Some(tx) = notifier {
                    notify(
                        tx,
                        Notification::FrameCaptured {
                            total_frames: sequence,
                        },
                    );
                }
            }
            Err(e) => {
                failed_ticks += 1;
                if failed_ticks <= 3 || failed_ticks % FAILURE_LOG_EVERY == 0 {
                    log::warn!("Capture tick failed ({} so far): {}", failed_ticks, e);
                }
            }
        }

        let elapsed = tick.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }

    let outcome = CaptureOutcome {
        frames,
        failed_ticks,
        elapsed: started.elapsed(),
    };

    log::info!(
        "Frame capture finished: {} frames in {:.1}s ({:.1} fps), {} failed ticks",
        outcome.frames.len(),
        outcome.elapsed.as_secs_f64(),
        outcome.achieved_fps(),
        outcome.failed_ticks
    );

    outcome
}

/// Handle to a running capture loop.
pub struct SchedulerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<CaptureOutcome>,
}

impl SchedulerHandle {
    /// Ask the loop to exit after the current tick without waiting for it.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Signal the loop and wait for it to exit. The current tick always finishes.
    pub fn stop(self) -> CaptureOutcome {
        self.request_stop();
        match self.thread.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                log::error!("Frame capture thread panicked, its frames are lost");
                CaptureOutcome::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    struct SolidScreen {
        grabs: u64,
        fail_every: Option<u64>,
    }

    impl ScreenSource for SolidScreen {
        fn grab(&mut self) -> Result<RgbImage, CaptureError> {
            self.grabs += 1;
            if let Some(n) = self.fail_every {
                if self.grabs % n == 0 {
                    return Err(CaptureError::CaptureFailed("display asleep".into()));
                }
            }
            Ok(RgbImage::from_pixel(4, 2, Rgb([self.grabs as u8, 0, 0])))
        }
    }

    fn solid(fail_every: Option<u64>) -> Box<dyn ScreenSource> {
        Box::new(SolidScreen {
            grabs: 0,
            fail_every,
        })
    }

    #[test]
    fn frame_interval_matches_fps() {
        assert_eq!(frame_interval(4), Duration::from_millis(250));
        assert_eq!(frame_interval(1), Duration::from_secs(1));
        // Zero fps must not divide by zero
        assert_eq!(frame_interval(0), Duration::from_secs(1));
    }

    #[test]
    fn paced_capture_rate_and_contiguous_sequence() {
        let handle = FrameScheduler::spawn(solid(None), 30, 0, None).unwrap();
        thread::sleep(Duration::from_millis(1000));
        let outcome = handle.stop();

        let count = outcome.frames.len() as f64;
        let expected = outcome.elapsed.as_secs_f64() * 30.0;
        assert!(
            count <= expected + 2.0 && count >= expected * 0.6,
            "captured {} frames, expected about {:.1}",
            count,
            expected
        );

        for (i, frame) in outcome.frames.iter().enumerate() {
            assert_eq!(frame.sequence, i as u64 + 1);
            assert_eq!((frame.width(), frame.height()), (4, 2));
        }
    }

    #[test]
    fn sequence_continues_from_offset() {
        let handle = FrameScheduler::spawn(solid(None), 60, 10, None).unwrap();
        thread::sleep(Duration::from_millis(100));
        let outcome = handle.stop();

        assert!(!outcome.frames.is_empty());
        assert_eq!(outcome.frames[0].sequence, 11);
    }

    #[test]
    fn failed_ticks_are_skipped_not_fatal() {
        let handle = FrameScheduler::spawn(solid(Some(2)), 60, 0, None).unwrap();
        thread::sleep(Duration::from_millis(300));
        let outcome = handle.stop();

        assert!(outcome.failed_ticks > 0);
        assert!(!outcome.frames.is_empty());
        // No gaps in numbering despite failures
        for pair in outcome.frames.windows(2) {
            assert_eq!(pair[1].sequence, pair[0].sequence + 1);
        }
    }

    #[test]
    fn notifies_cumulative_frame_count() {
        let (tx, mut rx) = crate::notify::notification_channel();
        let handle = FrameScheduler::spawn(solid(None), 60, 5, Some(tx)).unwrap();
        thread::sleep(Duration::from_millis(100));
        let outcome = handle.stop();

        let mut last = 5;
        while let Ok(n) = rx.try_recv() {
            match n {
                Notification::FrameCaptured { total_frames } => {
                    assert_eq!(total_frames, last + 1);
                    last = total_frames;
                }
                other => panic!("unexpected notification {:?}", other),
            }
        }
        assert_eq!(last, 5 + outcome.frames.len() as u64);
    }
}
