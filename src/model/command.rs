//! Console grammar: what the operator can type.
//!
//! ```text
//! w | s | a | d | f     joystick up/down/left/right, fire
//! r <params>            start a recorded run
//! l                     repeat the last run
//! p                     prepare for the next run
//! k                     kill the current recording
//! q                     quit
//! ```

use super::{RunParams, RunParamsError};

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A single-character device input, forwarded as-is.
    Input(char),

    /// Start a recorded run with the given parameter text.
    Run(String),

    /// Repeat the last run.
    Repeat,

    /// Drive the game back to the ready state.
    Prepare,

    /// Kill the current recording.
    Kill,

    /// Stop the control loop.
    Quit,
}

/// Errors from parsing a console line.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognised input: {0}")]
    Unrecognised(String),

    #[error("invalid run parameters: {0}")]
    InvalidParams(#[from] RunParamsError),
}

/// Single-character commands forwarded straight to the device.
const DEVICE_INPUTS: [char; 5] = ['w', 's', 'a', 'd', 'f'];

impl Command {
    /// Parses one console line. An empty line is `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        if let Some(params) = line.strip_prefix("r ") {
            let params = params.trim();
            params.parse::<RunParams>()?;
            return Ok(Some(Self::Run(params.to_string())));
        }

        let mut chars = line.chars();
        let command = match (chars.next(), chars.next()) {
            (Some(c), None) if DEVICE_INPUTS.contains(&c) => Self::Input(c),
            (Some('l'), None) => Self::Repeat,
            (Some('p'), None) => Self::Prepare,
            (Some('k'), None) => Self::Kill,
            (Some('q'), None) => Self::Quit,
            _ => return Err(CommandError::Unrecognised(line.to_string())),
        };
        Ok(Some(command))
    }

    /// Whether the command moves the game and must wait until no recording is in flight.
    pub fn drives_device(&self) -> bool {
        matches!(
            self,
            Self::Input(_) | Self::Run(_) | Self::Repeat | Self::Prepare
        )
    }
}
