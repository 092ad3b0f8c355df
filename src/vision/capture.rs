//! Frame acquisition from the capture device.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::debug;

use crate::config::VideoConfig;

use super::Frame;

/// Errors from pulling the next frame.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// No complete frame yet; retry.
    #[error("frame not ready")]
    NotReady,

    /// The stream ended; no more frames will come.
    #[error("capture stream closed")]
    Closed,

    #[error("capture I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A blocking supplier of frames.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Reads fixed-size raw grayscale frames from a byte stream.
#[derive(Debug)]
pub struct RawFrameReader<R> {
    inner: R,
    width: usize,
    height: usize,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(inner: R, width: usize, height: usize) -> Self {
        Self {
            inner,
            width,
            height,
        }
    }
}

impl<R: Read + Send> FrameSource for RawFrameReader<R> {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let mut pixels = vec![0u8; self.width * self.height];
        match self.inner.read_exact(&mut pixels) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(CaptureError::Closed),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(CaptureError::NotReady),
            Err(e) => return Err(e.into()),
        }
        Frame::from_raw(self.width, self.height, pixels).ok_or(CaptureError::NotReady)
    }
}

/// Captures from a V4L2 device through an `ffmpeg` child process.
///
/// ffmpeg decodes the camera stream, crops it to the configured area, and
/// writes raw 8-bit grayscale frames to its stdout.
#[derive(Debug)]
pub struct FfmpegCapture {
    child: Child,
    reader: RawFrameReader<ChildStdout>,
}

impl FfmpegCapture {
    pub fn spawn(device: &Path, video: &VideoConfig) -> Result<Self, CaptureError> {
        let crop = video.crop;
        let filter = format!(
            "crop={}:{}:{}:{}",
            crop.width(),
            crop.height(),
            crop.left,
            crop.top
        );

        let mut child = Command::new(&video.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-f", "v4l2"])
            .args(["-input_format", video.input_format.as_str()])
            .arg("-video_size")
            .arg(format!("{}x{}", video.width, video.height))
            .arg("-framerate")
            .arg(video.fps.to_string())
            .arg("-i")
            .arg(device)
            .args(["-vf", filter.as_str()])
            .args(["-f", "rawvideo", "-pix_fmt", "gray", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("ffmpeg stdout was not captured"))?;
        debug!(device = %device.display(), %filter, "capture started");

        Ok(Self {
            child,
            reader: RawFrameReader::new(stdout, crop.width() as usize, crop.height() as usize),
        })
    }
}

impl FrameSource for FfmpegCapture {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.reader.next_frame()
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        // Already-exited children make these fail; nothing left to clean up then.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
