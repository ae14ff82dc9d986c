//! Locating the ffmpeg binary.
//!
//! Lookup order: explicit path from settings, then `SCREENREC_FFMPEG`, then `PATH`.

use std::path::{Path, PathBuf};

pub const FFMPEG_ENV: &str = "SCREENREC_FFMPEG";

pub fn locate_ffmpeg(configured: Option<&Path>) -> Option<PathBuf> {
    let from_env = std::env::var_os(FFMPEG_ENV).map(PathBuf::from);
    resolve(configured, from_env.as_deref(), || which::which("ffmpeg").ok())
}

fn resolve(
    configured: Option<&Path>,
    from_env: Option<&Path>,
    search_path: impl FnOnce() -> Option<PathBuf>,
) -> Option<PathBuf> {
    for (origin, candidate) in [("settings", configured), ("environment", from_env)] {
        if let Some(path) = candidate.filter(|p| !p.as_os_str().is_empty()) {
            if path.is_file() {
                log::debug!("ffmpeg from {}: {:?}", origin, path);
                return Some(path.to_path_buf());
            }
            log::warn!("ffmpeg from {} does not exist: {:?}", origin, path);
        }
    }

    let found = search_path();
    match &found {
        Some(path) => log::debug!("ffmpeg from PATH: {:?}", path),
        None => log::warn!("ffmpeg not found; video export and audio muxing are unavailable"),
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let configured = dir.path().join("ffmpeg-custom");
        let env = dir.path().join("ffmpeg-env");
        std::fs::write(&configured, b"").unwrap();
        std::fs::write(&env, b"").unwrap();

        let found = resolve(Some(&configured), Some(&env), || None);
        assert_eq!(found, Some(configured));
    }

    #[test]
    fn missing_configured_path_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join("ffmpeg-env");
        std::fs::write(&env, b"").unwrap();

        let found = resolve(Some(&dir.path().join("gone")), Some(&env), || None);
        assert_eq!(found, Some(env));
    }

    #[test]
    fn path_search_is_last_resort() {
        let found = resolve(None, None, || Some(PathBuf::from("/usr/bin/ffmpeg")));
        assert_eq!(found, Some(PathBuf::from("/usr/bin/ffmpeg")));
        assert_eq!(resolve(Some(Path::new("")), None, || None), None);
    }
}
