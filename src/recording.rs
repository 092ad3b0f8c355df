//! Recording sessions: one encoded replay per attempt.
//!
//! A session records into a hidden temp file in the replay directory. When
//! the result appears, a postrun deadline is armed; once it passes, the
//! session is finalized: the encoder is closed, the temp file is moved to
//! its versioned replay name, and one runlog line is appended. A killed
//! session leaves nothing behind.

mod sink;

pub use sink::{FfmpegSinkFactory, RecordingSink, SinkError, SinkFactory};

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use jiff::Zoned;
use tempfile::TempPath;
use tracing::warn;

use crate::config::RecordingConfig;
use crate::model::{Outcome, RunRequest, RunlogEntry};
use crate::runlog::{Runlog, RunlogError};
use crate::vision::Frame;

const TEMP_PREFIX: &str = ".replay-";
const TEMP_SUFFIX: &str = ".avi";

/// Errors from opening or finalizing a session.
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("failed to create temp recording: {0}")]
    TempFile(#[source] io::Error),

    #[error("failed to start encoder: {0}")]
    Sink(#[from] SinkError),

    #[error("encoder did not finish cleanly ({source}); recording kept at {}", kept.display())]
    SinkFinalize { source: SinkError, kept: PathBuf },

    #[error("could not pick a replay name ({source}); recording kept at {}", kept.display())]
    Naming { source: RunlogError, kept: PathBuf },

    #[error("failed to move recording to {} ({source}); kept at {}", target.display(), kept.display())]
    Move {
        target: PathBuf,
        kept: PathBuf,
        source: io::Error,
    },

    #[error("failed to write runlog entry for {}: {source}", replay.display())]
    Runlog {
        replay: PathBuf,
        source: RunlogError,
    },
}

/// The result seen during a session and when to stop recording.
#[derive(Debug, Clone, Copy)]
struct Postrun {
    outcome: Outcome,
    deadline: Instant,
}

/// One in-progress recorded attempt. Owned by the vision loop.
pub struct Session {
    sink: Box<dyn RecordingSink>,
    temp: TempPath,
    request: RunRequest,
    postrun: Option<Postrun>,
}

impl Session {
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    pub fn request(&self) -> &RunRequest {
        &self.request
    }

    pub fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        self.sink.write_frame(frame)
    }

    pub fn is_armed(&self) -> bool {
        self.postrun.is_some()
    }

    /// Whether the postrun deadline is armed and has passed at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.postrun.is_some_and(|p| now >= p.deadline)
    }

    /// Records `outcome` and arms the deadline. Only the first call has any effect.
    ///
    /// Returns whether this call armed the session.
    pub fn arm(&mut self, outcome: Outcome, deadline: Instant) -> bool {
        if self.postrun.is_some() {
            return false;
        }
        self.postrun = Some(Postrun { outcome, deadline });
        true
    }

    /// Stops the encoder and deletes the temp file.
    pub fn discard(self) {
        self.sink.discard();
        // Dropping the TempPath removes the file.
    }
}

/// Opens and finalizes sessions.
pub struct Recorder {
    factory: Box<dyn SinkFactory>,
    runlog: Runlog,
    success_grace: Duration,
    fault_grace: Duration,
    tag_width: usize,
}

impl Recorder {
    pub fn new(factory: Box<dyn SinkFactory>, runlog: Runlog, config: &RecordingConfig) -> Self {
        Self {
            factory,
            runlog,
            success_grace: config.success_grace(),
            fault_grace: config.fault_grace(),
            tag_width: config.tag_width,
        }
    }

    #[cfg(test)]
    pub fn runlog(&self) -> &Runlog {
        &self.runlog
    }

    /// How long to keep recording after `outcome` appears.
    pub fn grace(&self, outcome: Outcome) -> Duration {
        match outcome {
            Outcome::Distance(_) => self.success_grace,
            Outcome::Fault => self.fault_grace,
        }
    }

    /// Opens a session for `request`, sized to match `frame`.
    pub fn open(&self, request: RunRequest, frame: &Frame) -> Result<Session, RecordingError> {
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(self.runlog.replays_dir())
            .map_err(RecordingError::TempFile)?
            .into_temp_path();

        let sink = self.factory.open(&temp, frame.width(), frame.height())?;

        Ok(Session {
            sink,
            temp,
            request,
            postrun: None,
        })
    }

    /// Closes the encoder, moves the replay into place, and appends the runlog entry.
    ///
    /// A session that was never armed is logged as a fault. On any failure
    /// before the move the temp file stays on disk.
    pub fn finalize(&self, session: Session) -> Result<RunlogEntry, RecordingError> {
        let Session {
            sink,
            temp,
            request,
            postrun,
        } = session;
        let outcome = postrun.map_or(Outcome::Fault, |p| p.outcome);

        if let Err(source) = sink.finalize() {
            return Err(RecordingError::SinkFinalize {
                source,
                kept: keep(temp),
            });
        }

        let target = match self
            .runlog
            .next_replay_path(&outcome.tag(self.tag_width), &request.disambiguators)
        {
            Ok(target) => target,
            Err(source) => {
                return Err(RecordingError::Naming {
                    source,
                    kept: keep(temp),
                });
            }
        };

        if let Err(e) = temp.persist_noclobber(&target) {
            return Err(RecordingError::Move {
                target,
                kept: keep(e.path),
                source: e.error,
            });
        }

        let entry = RunlogEntry {
            recorded_at: Zoned::now(),
            params: request.params,
            outcome,
            replay: target,
        };
        self.runlog
            .append(&entry)
            .map_err(|source| RecordingError::Runlog {
                replay: entry.replay.clone(),
                source,
            })?;
        Ok(entry)
    }
}

/// Disarms deletion of a temp file and returns where it is.
fn keep(temp: TempPath) -> PathBuf {
    match temp.keep() {
        Ok(path) => path,
        Err(e) => {
            warn!("could not keep {}: {}", e.path.display(), e.error);
            let path = e.path.to_path_buf();
            std::mem::forget(e.path);
            path
        }
    }
}
