//! Audio/video mux step: one ffmpeg run combining the intermediate video with
//! the mixed audio artifact.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread;
use std::time::Duration;

pub const DEFAULT_MUX_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub enum MuxError {
    Launch(String),
    Failed { code: Option<i32>, stderr: String },
    TimedOut(Duration),
    /// Exited successfully but wrote nothing
    MissingOutput(PathBuf),
    Runtime(String),
}

impl std::fmt::Display for MuxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MuxError::Launch(e) => write!(f, "Failed to launch muxer: {}", e),
            MuxError::Failed { code, stderr } => {
                write!(f, "Muxer exited with {:?}: {}", code, stderr)
            }
            MuxError::TimedOut(limit) => write!(f, "Muxer timed out after {:?}", limit),
            MuxError::MissingOutput(path) => write!(f, "Muxer produced no output at {:?}", path),
            MuxError::Runtime(e) => write!(f, "Mux runtime error: {}", e),
        }
    }
}

impl std::error::Error for MuxError {}

#[derive(Debug, Clone)]
pub struct Muxer {
    program: PathBuf,
    timeout: Duration,
}

impl Muxer {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `-y -i video -i audio -c:v <v> -c:a <a> -shortest output`
    pub fn args(video: &Path, audio: &Path, codecs: (&str, &str), output: &Path) -> Vec<OsString> {
        let (video_codec, audio_codec) = codecs;
        vec![
            "-y".into(),
            "-i".into(),
            video.into(),
            "-i".into(),
            audio.into(),
            "-c:v".into(),
            video_codec.into(),
            "-c:a".into(),
            audio_codec.into(),
            "-shortest".into(),
            output.into(),
        ]
    }

    /// Run the mux to completion, blocking the calling thread.
    ///
    /// Safe to call from inside a tokio runtime: the process is then driven on
    /// a separate thread with its own runtime.
    pub fn run(
        &self,
        video: &Path,
        audio: &Path,
        codecs: (&str, &str),
        output: &Path,
    ) -> Result<(), MuxError> {
        let args = Self::args(video, audio, codecs, output);
        log::info!("Muxing {:?} + {:?} -> {:?}", video, audio, output);
        log::debug!("Mux args: {:?}", args);

        let mux = move || -> Result<(), MuxError> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| MuxError::Runtime(e.to_string()))?;
            runtime.block_on(self.run_async(args))
        };

        // A nested block_on panics
        if tokio::runtime::Handle::try_current().is_ok() {
            log::debug!("Mux called from async context, using a dedicated thread");
            thread::scope(|scope| scope.spawn(mux).join())
                .unwrap_or_else(|_| Err(MuxError::Runtime("mux thread panicked".to_string())))?;
        } else {
            mux()?;
        }

        if !output.exists() {
            return Err(MuxError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }

    async fn run_async(&self, args: Vec<OsString>) -> Result<(), MuxError> {
        let child = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MuxError::Launch(format!("{:?}: {}", self.program, e)))?;

        // On timeout the future is dropped, which kills the child
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| MuxError::Launch(e.to_string()))?,
            Err(_) => return Err(MuxError::TimedOut(self.timeout)),
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
            Err(MuxError::Failed {
                code: output.status.code(),
                stderr: tail.into_iter().rev().collect::<Vec<_>>().join("; "),
            })
        }
    }
}
