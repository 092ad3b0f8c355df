//! Runlog and replay storage.
//!
//! Everything lives under the output directory:
//!
//! ```text
//! <out>/
//!   runlog.csv         # One line per finalized attempt
//!   replays/
//!     08123-01.avi     # {tag}[-{disambiguator}...]-{version}.avi
//!     fault-01.avi
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
};

// Trait must be in scope for `.write_all()` on File.
use io::Write;

use crate::model::RunlogEntry;

const RUNLOG_FILENAME: &str = "runlog.csv";
const REPLAYS_DIRNAME: &str = "replays";
const REPLAY_EXTENSION: &str = ".avi";

/// Errors that can occur while persisting results.
#[derive(Debug, thiserror::Error)]
pub enum RunlogError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = core::result::Result<T, RunlogError>;

/// The runlog file and the replay directory next to it.
#[derive(Debug, Clone)]
pub struct Runlog {
    path: PathBuf,
    replays_dir: PathBuf,
}

impl Runlog {
    /// Opens the runlog under `out_dir`, creating the replay directory if needed.
    pub fn new(out_dir: impl AsRef<Path>) -> Result<Self> {
        let out_dir = out_dir.as_ref();
        let replays_dir = out_dir.join(REPLAYS_DIRNAME);
        fs::create_dir_all(&replays_dir)?;
        Ok(Self {
            path: out_dir.join(RUNLOG_FILENAME),
            replays_dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn replays_dir(&self) -> &Path {
        &self.replays_dir
    }

    /// The first unused replay path for `tag` and `disambiguators`.
    ///
    /// The version is one past the highest version already present with the
    /// same prefix, starting at 1.
    pub fn next_replay_path(&self, tag: &str, disambiguators: &[String]) -> Result<PathBuf> {
        let prefix = replay_prefix(tag, disambiguators);

        let mut max_version = 0u32;
        for entry in fs::read_dir(&self.replays_dir)? {
            let name = entry?.file_name();
            if let Some(version) = name.to_str().and_then(|n| parse_version(n, &prefix)) {
                max_version = max_version.max(version);
            }
        }

        let version = max_version + 1;
        Ok(self
            .replays_dir
            .join(format!("{prefix}-{version:02}{REPLAY_EXTENSION}")))
    }

    /// Appends one line to the runlog.
    pub fn append(&self, entry: &RunlogEntry) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = entry.to_csv_line();
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

fn replay_prefix(tag: &str, disambiguators: &[String]) -> String {
    let mut prefix = tag.to_string();
    for part in disambiguators {
        prefix.push('-');
        prefix.push_str(part);
    }
    prefix
}

/// The version of `name` if it is `{prefix}-{version}.avi`.
fn parse_version(name: &str, prefix: &str) -> Option<u32> {
    name.strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(REPLAY_EXTENSION)?
        .parse()
        .ok()
}
