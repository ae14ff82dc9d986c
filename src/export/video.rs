//! Raw-frame video encoding through an ffmpeg child process.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use image::RgbImage;

use super::format::ExportFormat;
use super::ExportError;

/// Geometry and timing of the stream handed to a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSpec {
    pub format: ExportFormat,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

/// One open output container. Frames must all match the `VideoSpec` size.
pub trait VideoWriter {
    fn write_frame(&mut self, image: &RgbImage) -> Result<(), ExportError>;

    /// Flush and close the container.
    fn finish(self: Box<Self>) -> Result<(), ExportError>;
}

pub trait VideoWriterFactory: Send + Sync {
    fn open(&self, spec: &VideoSpec, path: &Path) -> Result<Box<dyn VideoWriter>, ExportError>;
}

/// Writers backed by `ffmpeg -f rawvideo -pix_fmt rgb24 -i pipe:0`.
#[derive(Debug, Clone)]
pub struct FfmpegWriterFactory {
    program: PathBuf,
}

impl FfmpegWriterFactory {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Encoder arguments for `spec`, excluding the program name.
pub(crate) fn encoder_args(spec: &VideoSpec, path: &Path) -> Result<Vec<String>, ExportError> {
    let codec = spec.format.direct_codec().ok_or_else(|| {
        ExportError::Encode(format!("{} is not encoded through ffmpeg", spec.format))
    })?;

    let mut args: Vec<String> = [
        "-hide_banner", "-loglevel", "error", "-nostats",
        "-y",
        "-f", "rawvideo",
        "-pix_fmt", "rgb24",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.extend([
        "-s".to_string(),
        format!("{}x{}", spec.width, spec.height),
        "-r".to_string(),
        spec.fps.max(1).to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
        // yuv420p needs even dimensions
        "-vf".to_string(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".to_string(),
        "-c:v".to_string(),
        codec.codec.to_string(),
    ]);

    if let Some(tag) = codec.tag {
        args.extend(["-vtag".to_string(), tag.to_string()]);
    }

    match codec.codec {
        "libvpx" => args.extend(["-b:v", "4M", "-crf", "10"].map(String::from)),
        _ => args.extend(["-q:v", "3"].map(String::from)),
    }

    args.extend(["-pix_fmt", "yuv420p", "-an"].map(String::from));
    args.push(path.display().to_string());
    Ok(args)
}

impl VideoWriterFactory for FfmpegWriterFactory {
    fn open(&self, spec: &VideoSpec, path: &Path) -> Result<Box<dyn VideoWriter>, ExportError> {
        let args = encoder_args(spec, path)?;

        log::info!(
            "Spawning encoder: {}x{} @ {} fps, {} -> {:?}",
            spec.width,
            spec.height,
            spec.fps,
            spec.format,
            path
        );
        log::debug!("Encoder args: {:?}", args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExportError::EncoderLaunch(format!("{:?}: {}", self.program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExportError::EncoderLaunch("encoder stdin unavailable".to_string()))?;

        Ok(Box::new(FfmpegWriter {
            child: Some(child),
            stdin: Some(stdin),
            frame_len: spec.width as usize * spec.height as usize * 3,
        }))
    }
}

struct FfmpegWriter {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frame_len: usize,
}

impl FfmpegWriter {
    fn stderr_tail(child: &mut Child) -> String {
        let mut text = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_string(&mut text);
        }
        let lines: Vec<&str> = text.lines().rev().take(5).collect();
        lines.into_iter().rev().collect::<Vec<_>>().join("; ")
    }
}

impl VideoWriter for FfmpegWriter {
    fn write_frame(&mut self, image: &RgbImage) -> Result<(), ExportError> {
        let raw = image.as_raw();
        if raw.len() != self.frame_len {
            return Err(ExportError::Encode(format!(
                "frame is {} bytes, encoder expects {}",
                raw.len(),
                self.frame_len
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ExportError::EncoderFailed("encoder input closed".to_string()))?;

        match stdin.write_all(raw) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                // The encoder died; its stderr says why
                self.stdin = None;
                let reason = match self.child.as_mut() {
                    Some(child) => {
                        let _ = child.wait();
                        Self::stderr_tail(child)
                    }
                    None => String::new(),
                };
                Err(ExportError::EncoderFailed(format!("exited early: {}", reason)))
            }
            Err(e) => Err(ExportError::Io(e.to_string())),
        }
    }

    fn finish(mut self: Box<Self>) -> Result<(), ExportError> {
        // EOF on stdin ends the stream
        drop(self.stdin.take());

        let mut child = self
            .child
            .take()
            .ok_or_else(|| ExportError::EncoderFailed("encoder already closed".to_string()))?;

        let status = child
            .wait()
            .map_err(|e| ExportError::EncoderFailed(format!("wait failed: {}", e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(ExportError::EncoderFailed(format!(
                "exit status {:?}: {}",
                status.code(),
                Self::stderr_tail(&mut child)
            )))
        }
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            log::warn!("Encoder abandoned before finish, killing it");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(format: ExportFormat) -> VideoSpec {
        VideoSpec {
            format,
            fps: 30,
            width: 641,
            height: 480,
        }
    }

    #[test]
    fn args_describe_raw_rgb_input() {
        let args = encoder_args(&spec(ExportFormat::Mp4), Path::new("/tmp/out.mp4")).unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt rgb24 -s 641x480 -r 30 -i pipe:0"));
        assert!(joined.contains("-c:v mpeg4"));
        assert!(joined.contains("-pix_fmt yuv420p"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn avi_is_tagged_xvid() {
        let args = encoder_args(&spec(ExportFormat::Avi), Path::new("out.avi")).unwrap();
        let pos = args.iter().position(|a| a == "-vtag").unwrap();
        assert_eq!(args[pos + 1], "XVID");
    }

    #[test]
    fn webm_uses_vp8() {
        let args = encoder_args(&spec(ExportFormat::Webm), Path::new("out.webm")).unwrap();
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libvpx"));
    }

    #[test]
    fn gif_is_rejected() {
        assert!(encoder_args(&spec(ExportFormat::Gif), Path::new("out.gif")).is_err());
    }

    #[test]
    fn missing_program_fails_to_launch() {
        let factory = FfmpegWriterFactory::new("/nonexistent/screenrec-ffmpeg");
        let dir = tempfile::tempdir().unwrap();
        let result = factory.open(&spec(ExportFormat::Mp4), &dir.path().join("out.mp4"));
        assert!(matches!(result, Err(ExportError::EncoderLaunch(_))));
    }
}
