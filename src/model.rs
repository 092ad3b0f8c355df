//! Core data model for javelin.
//!
//! These types describe one attempt at the minigame: what the screen shows,
//! what the operator asked for, and how the attempt ended.

mod command;
mod game_state;
mod outcome;
mod run;

pub use command::Command;
pub use game_state::GameState;
pub use outcome::Outcome;
pub use run::{RunParams, RunParamsError, RunRequest};

use jiff::Zoned;

/// A single line of the runlog: one finalized attempt.
#[derive(Debug, Clone)]
pub struct RunlogEntry {
    /// When the attempt was finalized.
    pub recorded_at: Zoned,

    /// The run parameters, verbatim.
    pub params: String,

    /// How the attempt ended.
    pub outcome: Outcome,

    /// Where the replay ended up.
    pub replay: std::path::PathBuf,
}

impl RunlogEntry {
    /// Formats the entry as one CSV line, without the trailing newline.
    ///
    /// `YYYY-mm-dd HH:MM:SS,"<params>",<outcome>,<replay path>`
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},\"{}\",{},{}",
            self.recorded_at.strftime("%Y-%m-%d %H:%M:%S"),
            self.params,
            self.outcome,
            self.replay.display()
        )
    }
}
