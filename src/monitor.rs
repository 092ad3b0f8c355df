//! Shared run state: the one piece of state every worker meets at.
//!
//! A mutex guards the latest game state, the recording flag, the run request
//! of the active recording, and a single-slot lifecycle mailbox. A condition
//! variable is broadcast whenever the game state changes or a recording
//! opens or closes.
//!
//! Access goes through [`RunGuard`], which holds the lock for its lifetime.
//! Nothing may block while holding a guard except [`RunGuard::wait`].

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::model::{GameState, RunRequest};

/// A one-shot lifecycle directive for the vision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Open a recording session for the stored run request.
    Start,

    /// Discard the active recording session.
    Kill,
}

#[derive(Debug, Default)]
struct RunStatus {
    game_state: GameState,
    recording: bool,
    run_request: Option<RunRequest>,
    directive: Option<Directive>,
}

/// The monitor shared by the dispatcher, the vision loop, and the autopilot.
#[derive(Debug, Default)]
pub struct SharedRunState {
    status: Mutex<RunStatus>,
    changed: Condvar,
}

impl SharedRunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the monitor.
    pub fn lock(&self) -> RunGuard<'_> {
        RunGuard {
            status: self.status.lock().unwrap_or_else(PoisonError::into_inner),
            changed: &self.changed,
        }
    }
}

/// Exclusive access to the shared run state.
pub struct RunGuard<'a> {
    status: MutexGuard<'a, RunStatus>,
    changed: &'a Condvar,
}

impl RunGuard<'_> {
    pub fn game_state(&self) -> GameState {
        self.status.game_state
    }

    /// Stores the latest classified state, waking all waiters if it changed.
    ///
    /// Returns whether the state changed.
    pub fn observe(&mut self, state: GameState) -> bool {
        if self.status.game_state == state {
            return false;
        }
        self.changed.notify_all();
        self.status.game_state = state;
        true
    }

    /// Whether a recording session is open.
    #[cfg(test)]
    pub fn is_recording(&self) -> bool {
        self.status.recording
    }

    /// Whether a recording is open or about to be opened.
    pub fn in_flight(&self) -> bool {
        self.status.recording || self.status.directive == Some(Directive::Start)
    }

    /// Marks a session as open. Wakes all waiters on the transition.
    pub fn begin_session(&mut self) {
        if !self.status.recording {
            self.status.recording = true;
            self.changed.notify_all();
        }
    }

    /// Clears everything tied to the current attempt and wakes all waiters.
    ///
    /// Safe to call with no session open.
    pub fn end_session(&mut self) {
        self.status.recording = false;
        self.status.run_request = None;
        self.status.directive = None;
        self.changed.notify_all();
    }

    /// The run request of the active (or pending) recording.
    pub fn run_request(&self) -> Option<&RunRequest> {
        self.status.run_request.as_ref()
    }

    /// Stores the run request and posts a start directive.
    pub fn request_start(&mut self, request: RunRequest) {
        self.status.run_request = Some(request);
        self.status.directive = Some(Directive::Start);
    }

    /// Posts a kill directive if a recording is in flight.
    ///
    /// A pending start is replaced, so it never opens. Returns `false`
    /// when there is nothing to kill.
    pub fn request_kill(&mut self) -> bool {
        if !self.in_flight() {
            return false;
        }
        self.status.directive = Some(Directive::Kill);
        true
    }

    /// Takes the pending directive, leaving the mailbox empty.
    pub fn take_directive(&mut self) -> Option<Directive> {
        self.status.directive.take()
    }

    /// Releases the monitor until the next broadcast, then reacquires it.
    ///
    /// Wakeups may be spurious; callers re-check their condition.
    #[must_use]
    pub fn wait(self) -> Self {
        let Self { status, changed } = self;
        let status = changed.wait(status).unwrap_or_else(PoisonError::into_inner);
        Self { status, changed }
    }

    /// Like [`RunGuard::wait`], giving up after `timeout`.
    ///
    /// The flag is `true` if the wait timed out.
    #[must_use]
    pub fn wait_timeout(self, timeout: Duration) -> (Self, bool) {
        let Self { status, changed } = self;
        let (status, result) = changed
            .wait_timeout(status, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        (Self { status, changed }, result.timed_out())
    }
}
