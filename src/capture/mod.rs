//! Screen capture: frame grabbing and the paced capture loop.
//!
//! `screen` talks to the OS through `xcap`; `scheduler` owns the capture thread.
//! Everything else only sees `ScreenSource` and `Frame`.

mod frame;
mod scheduler;
mod screen;

pub use frame::{Frame, FrameSequence};
pub use scheduler::{frame_interval, CaptureOutcome, FrameScheduler, SchedulerHandle, SUPPORTED_FPS};
pub use screen::{list_monitors, CaptureError, MonitorInfo, ScreenSource, XcapScreen};
