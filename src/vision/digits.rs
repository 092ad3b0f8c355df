//! Reading a number from individually located digit glyphs.

/// One digit glyph found in the result region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DigitMatch {
    /// Horizontal position of the glyph's left edge.
    pub x: usize,
    pub digit: u8,
    pub score: f32,
}

/// Assembles digits into a number, leftmost digit most significant.
///
/// Matches whose positions are closer than `min_spacing` are the same glyph
/// seen by more than one template or at neighbouring offsets; only the
/// best-scoring one survives. Digits that were never matched are absent,
/// not zero. A result with no readable digit at all reads as zero. Returns
/// `None` only if the value overflows.
pub fn decode_digits(matches: &[DigitMatch], min_spacing: usize) -> Option<u32> {
    let mut ranked: Vec<&DigitMatch> = matches.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<&DigitMatch> = Vec::new();
    for m in ranked {
        if kept.iter().all(|k| k.x.abs_diff(m.x) >= min_spacing.max(1)) {
            kept.push(m);
        }
    }
    kept.sort_by_key(|m| m.x);
    kept.iter().try_fold(0u32, |value, m| {
        value.checked_mul(10)?.checked_add(u32::from(m.digit))
    })
}
