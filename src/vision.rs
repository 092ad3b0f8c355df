//! Vision: frames in, game state out.
//!
//! Frames come from a [`FrameSource`], are reduced to a [`Classification`]
//! by a [`Classifier`], and may be shown through a [`Preview`].

mod capture;
mod classify;
mod digits;
mod frame;
mod matcher;
mod preview;

pub use capture::{CaptureError, FfmpegCapture, FrameSource};
pub use classify::{Classification, Classifier, Signal, TemplateClassifier};
pub use frame::{Frame, Region};
pub use preview::{NoPreview, Preview, SnapshotPreview};
