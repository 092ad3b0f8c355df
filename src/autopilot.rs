//! Continuous mode: unattended attempts with random run parameters.
//!
//! Each attempt draws an initial delay, a throw angle, and a (steps, press)
//! pair from the table of combinations that make a legal run-up, then goes
//! through the same prepare / start / record cycle as an operator-issued `r`.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::{info, warn};

use crate::dispatcher::prepare_for_run;
use crate::model::{RunParams, RunRequest};
use crate::monitor::SharedRunState;
use crate::transport::Transport;

const INITIAL_SKIP_MS: (u32, u32) = (100, 1_150);
const THROW_MS: (u32, u32) = (300, 500);

/// The first step count with an entry in [`PRESS_PER_STEPS`].
const MIN_STEPS: u32 = 20;

/// Allowed per-step press range in ms, indexed by step count from
/// [`MIN_STEPS`]. Longer run-ups need shorter presses to stay before the line.
#[rustfmt::skip]
const PRESS_PER_STEPS: [(u32, u32); 71] = [
    // 20-29
    (40, 80), (40, 80), (40, 80), (35, 80), (35, 80),
    (30, 80), (30, 75), (30, 70), (30, 70), (30, 65),
    // 30-39
    (25, 60), (25, 58), (25, 56), (25, 54), (25, 52),
    (20, 50), (20, 48), (20, 46), (20, 44), (20, 42),
    // 40-49
    (15, 40), (15, 39), (15, 38), (15, 37), (15, 36),
    (15, 35), (15, 34), (15, 33), (15, 32), (15, 31),
    // 50-59
    (10, 30), (10, 29), (10, 29), (10, 28), (10, 28),
    (10, 27), (10, 27), (10, 26), (10, 26), (10, 25),
    // 60-69
    (10, 25), (10, 24), (10, 23), (10, 23), (10, 22),
    (10, 22), (10, 21), (10, 21), (10, 20), (10, 20),
    // 70-90
    (10, 20), (10, 20), (10, 20), (10, 20), (10, 20),
    (10, 20), (10, 20), (10, 20), (10, 20), (10, 20),
    (10, 20), (10, 20), (10, 20), (10, 20), (10, 20),
    (10, 20), (10, 20), (10, 20), (10, 20), (10, 20),
    (10, 20),
];

/// Errors that stop continuous mode.
#[derive(Debug, thiserror::Error)]
pub enum AutopilotError {
    #[error("failed to write to device: {0}")]
    Transport(#[from] io::Error),

    #[error("recording still open after {0:?}; killed it")]
    Overrun(Duration),
}

/// Every allowed (steps, press-ms) combination.
fn step_choices() -> Vec<(u32, u32)> {
    (MIN_STEPS..)
        .zip(PRESS_PER_STEPS)
        .flat_map(|(steps, (min, max))| (min..=max).map(move |press| (steps, press)))
        .collect()
}

/// Draws run parameters for one attempt.
///
/// The (steps, press) pair is uniform over all allowed combinations, not
/// over step counts.
pub fn random_params<R: Rng + ?Sized>(rng: &mut R, choices: &[(u32, u32)]) -> Option<RunParams> {
    let &(steps, press) = choices.choose(rng)?;
    Some(RunParams {
        initial_fire_ms: None,
        initial_skip_ms: rng.random_range(INITIAL_SKIP_MS.0..=INITIAL_SKIP_MS.1),
        steps,
        step_press_ms: press,
        step_skip_ms: press,
        pre_throw_skip_ms: 0,
        throw_ms: rng.random_range(THROW_MS.0..=THROW_MS.1),
    })
}

/// The replay name components that identify a run-up.
fn request_for(params: &RunParams) -> RunRequest {
    RunRequest {
        params: params.to_string(),
        disambiguators: vec![
            format!("s{}", params.steps),
            format!("p{}", params.step_press_ms),
        ],
    }
}

/// Runs attempts back to back.
pub struct Autopilot<T> {
    state: Arc<SharedRunState>,
    transport: T,
    max_duration: Duration,
    choices: Vec<(u32, u32)>,
}

impl<T: Transport> Autopilot<T> {
    pub fn new(state: Arc<SharedRunState>, transport: T, max_duration: Duration) -> Self {
        Self {
            state,
            transport,
            max_duration,
            choices: step_choices(),
        }
    }

    /// Runs `attempts` attempts, or forever if `None`.
    pub fn run(&mut self, attempts: Option<u32>) -> Result<(), AutopilotError> {
        let mut rng = rand::rng();
        let mut done = 0u32;
        while attempts.is_none_or(|n| done < n) {
            self.attempt(&mut rng)?;
            done += 1;
        }
        info!("Finished {done} attempts");
        Ok(())
    }

    /// One attempt: prepare, start recording, send the run, wait for the result.
    pub fn attempt<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), AutopilotError> {
        let Some(params) = random_params(rng, &self.choices) else {
            return Ok(());
        };
        let request = request_for(&params);
        let line = request.device_line();
        info!("Running command: {line}");

        prepare_for_run(&self.state, &mut self.transport)?;
        self.state.lock().request_start(request);
        self.transport.send_line(&line)?;
        self.wait_for_result()
    }

    /// Blocks until the recording has opened and closed again.
    ///
    /// A recording that outlives `max_duration` is killed.
    fn wait_for_result(&self) -> Result<(), AutopilotError> {
        let deadline = Instant::now() + self.max_duration;
        let mut guard = self.state.lock();
        while guard.in_flight() {
            let now = Instant::now();
            if now >= deadline {
                warn!("Recording ran past {:?}; killing it", self.max_duration);
                guard.request_kill();
                while guard.in_flight() {
                    guard = guard.wait();
                }
                return Err(AutopilotError::Overrun(self.max_duration));
            }
            (guard, _) = guard.wait_timeout(deadline - now);
        }
        Ok(())
    }
}
