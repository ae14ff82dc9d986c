use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::export::{ExportFormat, DEFAULT_GIF_FPS, DEFAULT_MUX_TIMEOUT};

const SETTINGS_DIR_NAME: &str = "screenrec";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Capture rate; one of `SUPPORTED_FPS`.
    pub capture_fps: u32,

    /// Master switch for audio. When off, neither source is opened.
    pub record_audio: bool,
    pub record_system_audio: bool,
    pub record_microphone: bool,

    /// Microphone rate requested from the device when it supports it.
    pub preferred_sample_rate: u32,

    pub export_format: ExportFormat,

    /// Playback rate of exported GIFs. Frames are skipped to approximate it.
    pub gif_fps: u32,

    /// Where `Rec_<timestamp>.<ext>` files go. Defaults to the user's video directory.
    pub output_dir: Option<PathBuf>,

    /// Explicit ffmpeg binary. Falls back to `SCREENREC_FFMPEG`, then `PATH`.
    pub ffmpeg_path: Option<PathBuf>,

    /// Upper bound for the audio/video mux step.
    pub mux_timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            capture_fps: 30,
            record_audio: true,
            record_system_audio: true,
            record_microphone: true,
            preferred_sample_rate: 44100,
            export_format: ExportFormat::Mp4,
            gif_fps: DEFAULT_GIF_FPS,
            output_dir: None,
            ffmpeg_path: None,
            mux_timeout_secs: DEFAULT_MUX_TIMEOUT.as_secs(),
        }
    }
}

impl AppSettings {
    /// Output directory, falling back to the platform video dir, then the cwd.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .or_else(dirs::video_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

pub fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or("Could not determine config directory")?;
    Ok(dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
}

pub fn load_settings() -> AppSettings {
    match settings_path() {
        Ok(path) => load_settings_from(&path),
        Err(e) => {
            log::warn!("Settings: {}", e);
            AppSettings::default()
        }
    }
}

pub fn load_settings_from(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) -> Result<(), String> {
    save_settings_to(&settings_path()?, settings)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write to a sibling temp file, then rename over the real one
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // Windows rename fails if the destination exists
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&dir.path().join("settings.json"));
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.capture_fps, 30);
        assert_eq!(settings.gif_fps, 10);
        assert_eq!(settings.mux_timeout_secs, 300);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "capture_fps": 60, "export_format": "gif" }"#).unwrap();

        let settings = load_settings_from(&path);
        assert_eq!(settings.capture_fps, 60);
        assert_eq!(settings.export_format, ExportFormat::Gif);
        assert!(settings.record_microphone);
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings_from(&path), AppSettings::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = AppSettings {
            record_system_audio: false,
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            ..AppSettings::default()
        };

        save_settings_to(&path, &settings).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_settings_from(&path), settings);
    }

    #[test]
    fn explicit_output_dir_is_used() {
        let settings = AppSettings {
            output_dir: Some(PathBuf::from("/recordings")),
            ..AppSettings::default()
        };
        assert_eq!(settings.resolved_output_dir(), PathBuf::from("/recordings"));
    }
}
