use image::RgbImage;
use std::sync::Arc;

/// One captured still, 3-channel RGB, numbered in capture order.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based, monotonically increasing across all sub-runs of a recording
    pub sequence: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self { sequence, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Read-only view of a recording's frames, shared with the exporter.
pub type FrameSequence = Arc<Vec<Frame>>;
