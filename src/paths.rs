//! Scratch file locations
//!
//! Temporary artifacts live in: <tmp>/screenrec/{audio,video}/
//! File names carry the pid and a uuid so concurrent processes never collide.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MAX_ARTIFACTS: usize = 5;

fn scratch_root() -> PathBuf {
    std::env::temp_dir().join("screenrec")
}

/// Where mixed audio artifacts are written.
pub fn audio_scratch_dir() -> PathBuf {
    scratch_root().join("audio")
}

/// Where intermediate (pre-mux) videos are written.
pub fn video_scratch_dir() -> PathBuf {
    scratch_root().join("video")
}

/// Generate a unique, process-private file path inside `dir`, creating `dir`.
/// Format: <prefix>_<unix secs>_<pid>_<uuid>.<ext>
pub fn generate_artifact_path(dir: &Path, prefix: &str, ext: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let secs = chrono::Utc::now().timestamp();
    let filename = format!(
        "{}_{}_{}_{}.{}",
        prefix,
        secs,
        std::process::id(),
        Uuid::new_v4(),
        ext
    );
    Ok(dir.join(filename))
}

/// Remove a scratch file, ignoring "already gone" and any other failure.
pub fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Removed scratch file {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::debug!("Could not remove scratch file {:?}: {}", path, e),
    }
}

/// Clean up leftovers from earlier runs, keeping only the most recent N files.
pub fn cleanup_old_artifacts(dir: &Path) -> io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .collect();

    if entries.len() <= MAX_ARTIFACTS {
        return Ok(0);
    }

    // Sort by modified time (oldest first)
    entries.sort_by(|a, b| {
        let time_a = a.metadata().and_then(|m| m.modified()).ok();
        let time_b = b.metadata().and_then(|m| m.modified()).ok();
        time_a.cmp(&time_b)
    });

    let to_delete = entries.len() - MAX_ARTIFACTS;
    let mut deleted = 0;

    for entry in entries.into_iter().take(to_delete) {
        if fs::remove_file(entry.path()).is_ok() {
            log::debug!("Cleaned up old artifact: {:?}", entry.path());
            deleted += 1;
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_is_unique_and_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let a = generate_artifact_path(dir.path(), "audio", "wav").unwrap();
        let b = generate_artifact_path(dir.path(), "audio", "wav").unwrap();

        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir.path()));
        assert!(a.extension().map(|e| e == "wav").unwrap_or(false));
        assert!(a
            .to_string_lossy()
            .contains(&std::process::id().to_string()));
    }

    #[test]
    fn scratch_dirs_are_namespaced() {
        let audio = audio_scratch_dir();
        let video = video_scratch_dir();
        assert!(audio.to_string_lossy().contains("screenrec"));
        assert_ne!(audio, video);
    }

    #[test]
    fn cleanup_keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..(MAX_ARTIFACTS + 3) {
            fs::write(dir.path().join(format!("{}.wav", i)), b"x").unwrap();
        }

        let deleted = cleanup_old_artifacts(dir.path()).unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), MAX_ARTIFACTS);
    }

    #[test]
    fn cleanup_missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_artifacts(&dir.path().join("nope")).unwrap(), 0);
    }

    #[test]
    fn remove_quietly_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        remove_quietly(&dir.path().join("missing.wav"));
    }
}
