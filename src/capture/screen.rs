//! Screen grabbing using the `xcap` crate.
//!
//! This is the infrastructure layer: it talks to the OS. The monitor is resolved
//! again on every grab so that a disconnected display shows up as a failed tick
//! instead of a dangling handle.

use image::{imageops, DynamicImage, RgbImage};
use xcap::Monitor;

use crate::region::{CaptureTarget, Region};

#[derive(Debug, Clone)]
pub enum CaptureError {
    MonitorEnumeration(String),
    MonitorNotFound(String),
    /// The requested region does not overlap the monitor it starts on
    OutOfBounds(Region),
    CaptureFailed(String),
    ThreadSpawn(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::MonitorEnumeration(e) => write!(f, "Failed to enumerate monitors: {}", e),
            CaptureError::MonitorNotFound(what) => write!(f, "Monitor not found: {}", what),
            CaptureError::OutOfBounds(region) => {
                write!(f, "Region {} is outside of its monitor", region)
            }
            CaptureError::CaptureFailed(e) => write!(f, "Screen capture failed: {}", e),
            CaptureError::ThreadSpawn(e) => write!(f, "Failed to start capture thread: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Something that can produce one RGB still per call.
pub trait ScreenSource: Send {
    fn grab(&mut self) -> Result<RgbImage, CaptureError>;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MonitorInfo {
    pub index: usize,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

/// Enumerate monitors in the order `CaptureTarget::Monitor` indexes them.
pub fn list_monitors() -> Result<Vec<MonitorInfo>, CaptureError> {
    let monitors = Monitor::all().map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))?;

    let infos: Vec<MonitorInfo> = monitors
        .iter()
        .enumerate()
        .map(|(index, m)| MonitorInfo {
            index,
            name: m.name().unwrap_or_else(|_| format!("Display {}", index)),
            x: m.x().unwrap_or(0),
            y: m.y().unwrap_or(0),
            width: m.width().unwrap_or(0),
            height: m.height().unwrap_or(0),
            is_primary: m.is_primary().unwrap_or(false),
        })
        .collect();

    log::info!("Found {} monitor(s)", infos.len());
    for info in &infos {
        log::debug!(
            "  Monitor {} '{}' {}x{} at ({}, {}) primary={}",
            info.index,
            info.name,
            info.width,
            info.height,
            info.x,
            info.y,
            info.is_primary
        );
    }

    Ok(infos)
}

/// Native screen source for a region or a whole monitor.
pub struct XcapScreen {
    target: CaptureTarget,
}

impl XcapScreen {
    pub fn new(target: CaptureTarget) -> Self {
        Self { target }
    }

    fn monitor_by_index(index: usize) -> Result<Monitor, CaptureError> {
        Monitor::all()
            .map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))?
            .into_iter()
            .nth(index)
            .ok_or_else(|| CaptureError::MonitorNotFound(format!("index {}", index)))
    }

    fn monitor_bounds(monitor: &Monitor) -> Result<Region, CaptureError> {
        let geometry = || -> Result<(i32, i32, u32, u32), xcap::XCapError> {
            Ok((monitor.x()?, monitor.y()?, monitor.width()?, monitor.height()?))
        };
        let (x, y, width, height) =
            geometry().map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))?;

        Region::new(x, y, width, height)
            .map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))
    }

    fn grab_region(region: &Region) -> Result<RgbImage, CaptureError> {
        let monitor = Monitor::from_point(region.left, region.top)
            .map_err(|e| CaptureError::MonitorNotFound(format!("at {}: {}", region, e)))?;
        let bounds = Self::monitor_bounds(&monitor)?;
        let local = region
            .relative_to(&bounds)
            .ok_or(CaptureError::OutOfBounds(*region))?;

        let full = monitor
            .capture_image()
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        let (x, y, width, height) =
            physical_crop(&local, &bounds, full.width(), full.height())?;

        let cropped = imageops::crop_imm(&full, x, y, width, height).to_image();
        Ok(DynamicImage::ImageRgba8(cropped).to_rgb8())
    }
}

/// Map a monitor-local region onto the grabbed image.
///
/// The grabbed image is in physical pixels, monitor geometry is not (HiDPI).
fn physical_crop(
    local: &Region,
    bounds: &Region,
    image_width: u32,
    image_height: u32,
) -> Result<(u32, u32, u32, u32), CaptureError> {
    if image_width == 0 || image_height == 0 {
        return Err(CaptureError::CaptureFailed(format!(
            "empty {}x{} grab",
            image_width, image_height
        )));
    }

    let scale_x = image_width as f64 / bounds.width as f64;
    let scale_y = image_height as f64 / bounds.height as f64;
    let x = ((local.left as f64 * scale_x).round() as u32).min(image_width - 1);
    let y = ((local.top as f64 * scale_y).round() as u32).min(image_height - 1);
    let width = ((local.width as f64 * scale_x).round() as u32).clamp(1, image_width - x);
    let height = ((local.height as f64 * scale_y).round() as u32).clamp(1, image_height - y);
    Ok((x, y, width, height))
}

impl ScreenSource for XcapScreen {
    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        match &self.target {
            CaptureTarget::Region(region) => Self::grab_region(region),
            CaptureTarget::Monitor(index) => {
                let monitor = Self::monitor_by_index(*index)?;
                let image = monitor
                    .capture_image()
                    .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
                Ok(DynamicImage::ImageRgba8(image).to_rgb8())
            }
        }
    }
}
