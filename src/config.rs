//! javelin configuration.
//!
//! Loaded from `~/.javelin/config.toml` or `--config <path>`. Every key is
//! optional; a missing default config file means built-in defaults.
//!
//! ```toml
//! [serial]
//! baud = 19200
//!
//! [video]
//! fps = 20
//! crop = { left = 182, top = 60, right = 1092, bottom = 660 }
//!
//! [detect]
//! templates-dir = "templates"
//! threshold = 0.95
//!
//! [recording]
//! success-grace-ms = 3000
//! fault-grace-ms = 10000
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::vision::Region;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// javelin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub serial: SerialConfig,
    pub video: VideoConfig,
    pub detect: DetectConfig,
    pub recording: RecordingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SerialConfig {
    pub baud: u32,
    /// `stty` binary used to put the port into raw mode.
    pub stty: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: 19_200,
            stty: "stty".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Capture format requested from the camera.
    pub input_format: String,
    pub ffmpeg: PathBuf,
    /// Encoder for replays.
    pub codec: String,
    /// FourCC tag written into replay files.
    pub fourcc: String,
    /// The part of the captured picture that is classified and recorded.
    pub crop: Region,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 20,
            input_format: "mjpeg".into(),
            ffmpeg: PathBuf::from("ffmpeg"),
            codec: "mpeg4".into(),
            fourcc: "XVID".into(),
            crop: Region::new(182, 60, 1092, 660),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DetectConfig {
    /// Directory holding `practice.jpg`, `try-again.jpg`, `f.jpg`, `m.jpg`, `0.jpg`..`9.jpg`.
    pub templates_dir: PathBuf,
    /// Minimum match score for a template to count as present.
    pub threshold: f32,
    /// Where the practice / try-again banners appear, relative to the crop.
    pub banner_region: Region,
    /// Where the result digits and unit appear, relative to the crop.
    pub result_region: Region,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            threshold: 0.95,
            banner_region: Region::new(430, 575, 680, 598),
            result_region: Region::new(670, 575, 1092, 598),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RecordingConfig {
    /// Video tail kept after a distance appears.
    pub success_grace_ms: u64,
    /// Video tail kept after a fault appears.
    pub fault_grace_ms: u64,
    /// Zero-padding width of the distance in replay names.
    pub tag_width: usize,
    /// Longest an unattended recording may stay open.
    pub max_duration_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            success_grace_ms: 3_000,
            fault_grace_ms: 10_000,
            tag_width: 5,
            max_duration_ms: 60_000,
        }
    }
}

impl RecordingConfig {
    pub fn success_grace(&self) -> Duration {
        Duration::from_millis(self.success_grace_ms)
    }

    pub fn fault_grace(&self) -> Duration {
        Duration::from_millis(self.fault_grace_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

impl Config {
    /// Load config from `path`, or from the default location.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        let contents = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !required => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        Self::parse(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// The default config file path: `~/.javelin/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".javelin").join("config.toml"))
    }
}
