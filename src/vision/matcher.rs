//! Template matching by zero-mean normalized cross-correlation.
//!
//! A score of 1.0 is a perfect match, 0.0 no correlation. Flat windows and
//! flat templates carry no signal and always score 0.0.

use super::Frame;

/// A glyph or banner to look for, pre-centered for scoring.
#[derive(Debug, Clone)]
pub struct Template {
    width: usize,
    height: usize,
    /// Pixels minus the template mean.
    centered: Vec<f32>,
    /// Euclidean norm of `centered`.
    norm: f32,
}

impl Template {
    pub fn new(frame: &Frame) -> Self {
        let n = frame.pixels().len().max(1) as f32;
        let mean = frame.pixels().iter().map(|&p| f32::from(p)).sum::<f32>() / n;
        let centered: Vec<f32> = frame.pixels().iter().map(|&p| f32::from(p) - mean).collect();
        let norm = centered.iter().map(|v| v * v).sum::<f32>().sqrt();

        Self {
            width: frame.width(),
            height: frame.height(),
            centered,
            norm,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Score of the template with its top-left corner at `(x, y)`. The window must fit.
    fn score_at(&self, image: &Frame, x: usize, y: usize) -> f32 {
        if self.norm <= f32::EPSILON {
            return 0.0;
        }

        // Accumulate in f64: sums of squares over a glyph overflow f32 precision.
        let n = (self.width * self.height) as f64;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut cross = 0.0f64;
        for ty in 0..self.height {
            let row = &image.row(y + ty)[x..x + self.width];
            let trow = &self.centered[ty * self.width..(ty + 1) * self.width];
            for (&p, &t) in row.iter().zip(trow) {
                let p = f64::from(p);
                sum += p;
                sum_sq += p * p;
                cross += p * f64::from(t);
            }
        }

        let variance = sum_sq - sum * sum / n;
        if variance <= 1e-6 {
            return 0.0;
        }
        (cross / (f64::from(self.norm) * variance.sqrt())) as f32
    }

    /// Visits every placement of the template inside `image`.
    fn scores<'a>(&'a self, image: &'a Frame) -> impl Iterator<Item = (usize, usize, f32)> + 'a {
        let (xs, ys) = if self.width == 0 || self.height == 0 {
            (0, 0)
        } else {
            (
                (image.width() + 1).saturating_sub(self.width),
                (image.height() + 1).saturating_sub(self.height),
            )
        };
        (0..ys).flat_map(move |y| (0..xs).map(move |x| (x, y, self.score_at(image, x, y))))
    }

    /// Best score anywhere in `image`; 0.0 if the template does not fit.
    pub fn best_score(&self, image: &Frame) -> f32 {
        self.scores(image)
            .map(|(_, _, s)| s)
            .fold(0.0, f32::max)
    }

    /// Every placement scoring at least `threshold`, as `(x, y, score)`.
    pub fn matches_at_least(&self, image: &Frame, threshold: f32) -> Vec<(usize, usize, f32)> {
        self.scores(image).filter(|&(_, _, s)| s >= threshold).collect()
    }
}
