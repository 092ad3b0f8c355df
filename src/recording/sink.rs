//! Recording sinks: where the frames of one session are encoded.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::debug;

use crate::config::VideoConfig;
use crate::vision::Frame;

/// Errors from an encoder.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("encoder I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encoder failed: {0}")]
    Encoder(String),
}

/// An open encoder for one session.
pub trait RecordingSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// Flushes and closes the output. The file is complete once this returns `Ok`.
    fn finalize(self: Box<Self>) -> Result<(), SinkError>;

    /// Stops encoding without completing the output.
    fn discard(self: Box<Self>);
}

/// Opens sinks writing to a given path.
pub trait SinkFactory: Send {
    fn open(
        &self,
        path: &Path,
        width: usize,
        height: usize,
    ) -> Result<Box<dyn RecordingSink>, SinkError>;
}

/// Encodes with an `ffmpeg` child fed raw grayscale frames on stdin.
#[derive(Debug, Clone)]
pub struct FfmpegSinkFactory {
    ffmpeg: PathBuf,
    fps: u32,
    codec: String,
    fourcc: String,
}

impl FfmpegSinkFactory {
    pub fn new(video: &VideoConfig) -> Self {
        Self {
            ffmpeg: video.ffmpeg.clone(),
            fps: video.fps,
            codec: video.codec.clone(),
            fourcc: video.fourcc.clone(),
        }
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn open(
        &self,
        path: &Path,
        width: usize,
        height: usize,
    ) -> Result<Box<dyn RecordingSink>, SinkError> {
        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "gray"])
            .arg("-s")
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(self.fps.to_string())
            .args(["-i", "-"])
            .args(["-c:v", self.codec.as_str(), "-vtag", self.fourcc.as_str()])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SinkError::Encoder("ffmpeg stdin was not captured".into()))?;
        debug!(path = %path.display(), width, height, "encoder started");

        Ok(Box::new(FfmpegSink {
            child,
            stdin: Some(stdin),
        }))
    }
}

struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl RecordingSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SinkError::Encoder("encoder input already closed".into()))?;
        stdin.write_all(frame.pixels())?;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<(), SinkError> {
        // Closing stdin is ffmpeg's end-of-stream.
        drop(self.stdin.take());
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(SinkError::Encoder(format!("ffmpeg exited with {status}")))
        }
    }

    fn discard(self: Box<Self>) {
        // Drop kills the encoder.
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
