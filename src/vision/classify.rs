//! Frame classification: which phase the game is in, and the result if one is shown.

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::config::DetectConfig;
use crate::model::GameState;

use super::digits::{DigitMatch, decode_digits};
use super::matcher::Template;
use super::{Frame, Region};

/// A terminal signal read from the result line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The fault marker is shown.
    Fault,

    /// A distance is shown, in centimeters.
    Distance(u32),
}

/// What one frame says about the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub state: GameState,
    pub signal: Option<Signal>,
}

#[cfg(test)]
impl Classification {
    pub fn new(state: GameState) -> Self {
        Self {
            state,
            signal: None,
        }
    }

    pub fn with_signal(state: GameState, signal: Signal) -> Self {
        Self {
            state,
            signal: Some(signal),
        }
    }
}

/// Turns one frame into a [`Classification`]. Pure: no state between frames.
pub trait Classifier: Send {
    fn classify(&self, frame: &Frame) -> Classification;
}

/// Errors from loading templates.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to load template {path}: {source}")]
    Load {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Glyphs and banners the classifier looks for.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub practice: Template,
    pub try_again: Template,
    pub fault: Template,
    pub meters: Template,
    /// Indexed by digit value.
    pub digits: Vec<Template>,
}

impl TemplateSet {
    /// Loads `practice`, `try-again`, `f`, `m` and `0`..`9` from `dir/<name>.jpg`.
    pub fn load(dir: &Path) -> Result<Self, TemplateError> {
        let load = |name: &str| load_template(&dir.join(format!("{name}.jpg")));

        let digits = (0..10)
            .map(|d| load(&d.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            practice: load("practice")?,
            try_again: load("try-again")?,
            fault: load("f")?,
            meters: load("m")?,
            digits,
        })
    }
}

fn load_template(path: &Path) -> Result<Template, TemplateError> {
    let img = image::open(path).map_err(|source| TemplateError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    let luma = img.to_luma8();
    let (width, height) = luma.dimensions();
    let frame = Frame::from_raw(width as usize, height as usize, luma.into_raw())
        .unwrap_or_else(|| Frame::filled(0, 0, 0));
    Ok(Template::new(&frame))
}

/// Classifies frames by matching templates in two fixed regions.
///
/// The banner region holds "practice" or "try again"; the result region holds
/// the distance digits followed by "m", or the fault "f".
#[derive(Debug, Clone)]
pub struct TemplateClassifier {
    templates: TemplateSet,
    threshold: f32,
    banner_region: Region,
    result_region: Region,
}

impl TemplateClassifier {
    pub fn new(templates: TemplateSet, config: &DetectConfig) -> Self {
        Self {
            templates,
            threshold: config.threshold,
            banner_region: config.banner_region,
            result_region: config.result_region,
        }
    }

    /// Loads templates from the configured directory.
    pub fn load(config: &DetectConfig) -> Result<Self, TemplateError> {
        Ok(Self::new(TemplateSet::load(&config.templates_dir)?, config))
    }

    fn present(&self, template: &Template, region: &Frame) -> bool {
        template.best_score(region) > self.threshold
    }

    /// Locates every digit glyph in the result region and reads them left to right.
    fn read_distance(&self, result: &Frame) -> Option<u32> {
        let mut matches = Vec::new();
        let mut glyph_width = usize::MAX;
        for (digit, template) in (0u8..).zip(&self.templates.digits) {
            glyph_width = glyph_width.min(template.width());
            for (x, _, score) in template.matches_at_least(result, self.threshold) {
                matches.push(DigitMatch { x, digit, score });
            }
        }
        decode_digits(&matches, glyph_width / 2)
    }
}

impl Classifier for TemplateClassifier {
    fn classify(&self, frame: &Frame) -> Classification {
        let banner = frame.crop(self.banner_region);
        let result = frame.crop(self.result_region);

        let try_again = self.present(&self.templates.try_again, &banner);
        let practice = self.present(&self.templates.practice, &banner);
        let fault = self.present(&self.templates.fault, &result);
        let meters = self.present(&self.templates.meters, &result);
        trace!(try_again, practice, fault, meters, "classified frame");

        let state = if try_again {
            GameState::TryAgain
        } else if fault || meters {
            GameState::Finished
        } else if practice {
            GameState::ReadyToRun
        } else {
            GameState::Unknown
        };

        let signal = if fault {
            Some(Signal::Fault)
        } else if meters {
            self.read_distance(&result).map(Signal::Distance)
        } else {
            None
        };

        Classification { state, signal }
    }
}
