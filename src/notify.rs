//! Notifications sent from the recording core to whatever front end is attached.
//!
//! Uses tagged union format: { "event": "frameCaptured", "totalFrames": 12 }

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Notification {
    FrameCaptured {
        #[serde(rename = "totalFrames")]
        total_frames: u64,
    },
    RecordingStopped {
        #[serde(rename = "totalFrames")]
        total_frames: u64,
        #[serde(rename = "hasAudio")]
        has_audio: bool,
    },
    ExportProgress {
        percent: u8,
    },
    ExportFinished {
        success: bool,
        /// Output path on success, reason on failure
        message: String,
    },
}

pub type Notifier = mpsc::UnboundedSender<Notification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

pub fn notification_channel() -> (Notifier, NotificationReceiver) {
    mpsc::unbounded_channel()
}

/// Send a notification; a closed receiver only means nobody is listening.
pub fn notify(notifier: &Notifier, notification: Notification) {
    log::trace!("Notification: {:?}", notification);
    if notifier.send(notification).is_err() {
        log::debug!("Notification receiver dropped");
    }
}

/// HH:MM:SS for an elapsed recording time.
pub fn format_elapsed(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}
