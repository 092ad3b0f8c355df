//! Grayscale frames and rectangular regions.

use serde::Deserialize;

/// A rectangle given by its edges, right and bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Region {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// One 8-bit grayscale picture, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Frame {
    /// Wraps raw pixels. `None` if the buffer does not hold exactly `width * height` bytes.
    pub fn from_raw(width: usize, height: usize, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// A frame of a single gray level.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[cfg(test)]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * self.width + x]
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    /// Copies out `region`, clamped to the frame. A region fully outside gives an empty frame.
    pub fn crop(&self, region: Region) -> Frame {
        let left = (region.left as usize).min(self.width);
        let right = (region.right as usize).clamp(left, self.width);
        let top = (region.top as usize).min(self.height);
        let bottom = (region.bottom as usize).clamp(top, self.height);

        let width = right - left;
        let height = bottom - top;
        let mut pixels = Vec::with_capacity(width * height);
        for y in top..bottom {
            pixels.extend_from_slice(&self.row(y)[left..right]);
        }

        Frame {
            width,
            height,
            pixels,
        }
    }

    /// Copies `other` into this frame with its top-left corner at `(x, y)`, clipping at the edges.
    #[cfg(test)]
    pub fn paste(&mut self, other: &Frame, x: usize, y: usize) {
        if x >= self.width {
            return;
        }
        for oy in 0..other.height {
            let ty = y + oy;
            if ty >= self.height {
                break;
            }
            let n = other.width.min(self.width.saturating_sub(x));
            let start = ty * self.width + x;
            self.pixels[start..start + n].copy_from_slice(&other.row(oy)[..n]);
        }
    }
}
