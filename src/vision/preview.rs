//! Live preview. Purely informational; never affects the run.

use std::path::PathBuf;

use image::{GrayImage, ImageFormat};
use tracing::warn;

use super::Frame;

/// Receives every captured frame for display.
pub trait Preview: Send {
    fn show(&mut self, frame: &Frame);
}

/// Shows nothing.
#[derive(Debug, Default)]
pub struct NoPreview;

impl Preview for NoPreview {
    fn show(&mut self, _frame: &Frame) {}
}

/// Overwrites a PNG with the latest frame every `every` frames.
#[derive(Debug)]
pub struct SnapshotPreview {
    path: PathBuf,
    every: u32,
    seen: u32,
    warned: bool,
}

impl SnapshotPreview {
    pub fn new(path: impl Into<PathBuf>, every: u32) -> Self {
        Self {
            path: path.into(),
            every: every.max(1),
            seen: 0,
            warned: false,
        }
    }
}

impl Preview for SnapshotPreview {
    fn show(&mut self, frame: &Frame) {
        self.seen = self.seen.wrapping_add(1);
        if self.seen % self.every != 0 {
            return;
        }

        let Some(img) = GrayImage::from_raw(
            frame.width() as u32,
            frame.height() as u32,
            frame.pixels().to_vec(),
        ) else {
            return;
        };

        if let Err(e) = img.save_with_format(&self.path, ImageFormat::Png)
            && !self.warned
        {
            warn!("preview disabled: failed to write {}: {e}", self.path.display());
            self.warned = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn writes_every_nth_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preview.png");
        let mut preview = SnapshotPreview::new(&path, 3);
        let frame = Frame::filled(8, 4, 200);

        preview.show(&frame);
        preview.show(&frame);
        assert!(!path.exists());

        preview.show(&frame);
        let written = image::open(&path).unwrap().to_luma8();
        assert_eq!(written.dimensions(), (8, 4));
        assert_eq!(written.get_pixel(0, 0).0, [200]);
    }

    #[test]
    fn unwritable_path_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let mut preview = SnapshotPreview::new(dir.path().join("missing").join("p.png"), 1);

        preview.show(&Frame::filled(2, 2, 0));
        preview.show(&Frame::filled(2, 2, 0));
        assert!(preview.warned);
    }
}
