//! Game state: which on-screen phase the game is in.

use std::fmt;

/// Which phase the controlled game is showing.
///
/// Normally an attempt walks `ReadyToRun` → `Finished` → `TryAgain` → `ReadyToRun`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GameState {
    /// Nothing recognizable on screen: menus, transitions, a throw in progress.
    #[default]
    Unknown,

    /// The practice banner is up; a run can be started.
    ReadyToRun,

    /// A result ("m" distance or "f" fault) is displayed.
    Finished,

    /// The "try again" banner is up.
    TryAgain,
}

impl GameState {
    /// Whether the device needs an advance (fire) press to get back to `ReadyToRun`.
    pub fn needs_advance(self) -> bool {
        matches!(self, Self::Finished | Self::TryAgain)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::ReadyToRun => "ready",
            Self::Finished => "finished",
            Self::TryAgain => "try-again",
        };
        f.write_str(name)
    }
}
