//! The vision loop: classify every frame, publish the game state, and drive
//! the recording session lifecycle.
//!
//! Each frame is handled in three phases. Under the monitor, the classified
//! state is stored and the pending directive is taken. Outside it, the
//! session is opened, written, discarded, or finalized. Back under the
//! monitor, a session that ended is cleared. Encoder and file I/O never
//! happen while the monitor is held.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, trace};

use crate::model::{Outcome, RunRequest};
use crate::monitor::{Directive, SharedRunState};
use crate::recording::{Recorder, Session};
use crate::vision::{
    CaptureError, Classification, Classifier, Frame, FrameSource, NoPreview, Preview, Signal,
};

/// What to do with the session after leaving the monitor.
enum Action {
    Open(RunRequest),
    Kill,
}

pub struct VisionLoop {
    source: Box<dyn FrameSource>,
    classifier: Box<dyn Classifier>,
    state: Arc<SharedRunState>,
    recorder: Recorder,
    preview: Box<dyn Preview>,
    session: Option<Session>,
}

impl VisionLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        classifier: Box<dyn Classifier>,
        state: Arc<SharedRunState>,
        recorder: Recorder,
    ) -> Self {
        Self {
            source,
            classifier,
            state,
            recorder,
            preview: Box::new(NoPreview),
            session: None,
        }
    }

    #[must_use]
    pub fn with_preview(mut self, preview: Box<dyn Preview>) -> Self {
        self.preview = preview;
        self
    }

    /// Processes frames until the source closes or fails.
    ///
    /// Frames that are not ready yet are retried without touching any state.
    pub fn run(mut self) -> Result<(), CaptureError> {
        loop {
            let frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(CaptureError::NotReady) => continue,
                Err(e) => {
                    if let Some(session) = self.session.take() {
                        session.discard();
                    }
                    return Err(e);
                }
            };

            let classification = self.classifier.classify(&frame);
            trace!(state = %classification.state, signal = ?classification.signal, "frame");
            self.step(&frame, classification, Instant::now());
            self.preview.show(&frame);
        }
    }

    /// Handles one classified frame captured at `now`.
    fn step(&mut self, frame: &Frame, classification: Classification, now: Instant) {
        let state = Arc::clone(&self.state);

        let action = {
            let mut guard = state.lock();
            if guard.observe(classification.state) {
                debug!(state = %classification.state, "game state changed");
            }
            match guard.take_directive() {
                Some(Directive::Start) if self.session.is_some() => {
                    debug!("start ignored: a session is already open");
                    None
                }
                Some(Directive::Start) => match guard.run_request().cloned() {
                    Some(request) => {
                        guard.begin_session();
                        Some(Action::Open(request))
                    }
                    None => None,
                },
                Some(Directive::Kill) if self.session.is_none() => {
                    // The start it replaced never opened.
                    guard.end_session();
                    None
                }
                Some(Directive::Kill) => Some(Action::Kill),
                None => None,
            }
        };

        let ended = self.apply(action, frame) | self.record(frame, classification, now);
        if ended {
            state.lock().end_session();
        }
    }

    /// Opens or kills the session. Returns whether the attempt ended.
    fn apply(&mut self, action: Option<Action>, frame: &Frame) -> bool {
        match action {
            Some(Action::Open(request)) => match self.recorder.open(request, frame) {
                Ok(session) => {
                    info!(
                        "Saving to {} ({})",
                        session.temp_path().display(),
                        session.request().device_line()
                    );
                    self.session = Some(session);
                    false
                }
                Err(e) => {
                    error!("Could not start recording: {e}");
                    true
                }
            },
            Some(Action::Kill) => {
                if let Some(session) = self.session.take() {
                    session.discard();
                    info!("Recording killed");
                }
                true
            }
            None => false,
        }
    }

    /// Appends the frame to the open session and advances its postrun.
    /// Returns whether the session ended.
    fn record(&mut self, frame: &Frame, classification: Classification, now: Instant) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        if let Err(e) = session.write(frame) {
            error!("Recording failed, discarding it: {e}");
            if let Some(session) = self.session.take() {
                session.discard();
            }
            return true;
        }

        if session.is_due(now) {
            if let Some(session) = self.session.take() {
                match self.recorder.finalize(session) {
                    Ok(entry) => info!("Postrun finished; moved to {}", entry.replay.display()),
                    Err(e) => error!("Failed to save recording: {e}"),
                }
            }
            return true;
        }

        if !session.is_armed()
            && let Some(signal) = classification.signal
        {
            let outcome = match signal {
                Signal::Fault => {
                    info!("Failed throw");
                    Outcome::Fault
                }
                Signal::Distance(cm) => {
                    let outcome = Outcome::Distance(cm);
                    info!("Successful throw: {outcome} m");
                    outcome
                }
            };
            session.arm(outcome, now + self.recorder.grace(outcome));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::fs;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::model::GameState;
    use crate::recording::tests::{CountingSinkFactory, SinkCounts, test_recorder};

    const FAULT_GRACE: Duration = Duration::from_secs(10);
    const SUCCESS_GRACE: Duration = Duration::from_secs(3);

    /// Yields scripted capture results, then reports the stream closed.
    struct ScriptedSource(VecDeque<Result<Frame, CaptureError>>);

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Frame, CaptureError> {
            self.0.pop_front().unwrap_or(Err(CaptureError::Closed))
        }
    }

    /// Reads the classification from the first pixel.
    struct PixelClassifier;

    impl Classifier for PixelClassifier {
        fn classify(&self, frame: &Frame) -> Classification {
            match frame.pixel(0, 0) {
                1 => Classification::new(GameState::ReadyToRun),
                2 => Classification::with_signal(GameState::Finished, Signal::Fault),
                _ => Classification::new(GameState::Unknown),
            }
        }
    }

    struct Harness {
        _dir: TempDir,
        counts: Arc<SinkCounts>,
        state: Arc<SharedRunState>,
        vision: VisionLoop,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_factory(CountingSinkFactory::default())
        }

        fn with_factory(factory: CountingSinkFactory) -> Self {
            let counts = Arc::clone(&factory.counts);
            let (dir, recorder) = test_recorder(factory);
            let state = Arc::new(SharedRunState::new());
            let vision = VisionLoop::new(
                Box::new(ScriptedSource(VecDeque::new())),
                Box::new(PixelClassifier),
                Arc::clone(&state),
                recorder,
            );
            Self {
                _dir: dir,
                counts,
                state,
                vision,
            }
        }

        fn start(&self) {
            self.state
                .lock()
                .request_start(RunRequest::new("-1,500,30,55,55,0,400"));
        }

        fn kill(&self) -> bool {
            self.state.lock().request_kill()
        }

        fn step(&mut self, classification: Classification, now: Instant) {
            self.vision.step(&Frame::filled(4, 3, 0), classification, now);
        }

        fn runlog_lines(&self) -> Vec<String> {
            fs::read_to_string(self.vision.recorder.runlog().path())
                .map(|s| s.lines().map(String::from).collect())
                .unwrap_or_default()
        }

        fn replays(&self) -> Vec<String> {
            let mut names: Vec<String> = fs::read_dir(self.vision.recorder.runlog().replays_dir())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
    }

    fn unknown() -> Classification {
        Classification::new(GameState::Unknown)
    }

    fn fault() -> Classification {
        Classification::with_signal(GameState::Finished, Signal::Fault)
    }

    fn distance(cm: u32) -> Classification {
        Classification::with_signal(GameState::Finished, Signal::Distance(cm))
    }

    #[test]
    fn publishes_classified_state() {
        let mut h = Harness::new();
        h.step(Classification::new(GameState::TryAgain), Instant::now());

        assert_eq!(h.state.lock().game_state(), GameState::TryAgain);
    }

    #[test]
    fn start_opens_one_session() {
        let mut h = Harness::new();
        h.start();
        h.step(unknown(), Instant::now());

        let mut guard = h.state.lock();
        assert!(guard.is_recording());
        assert!(guard.take_directive().is_none());
        drop(guard);
        assert_eq!(SinkCounts::get(&h.counts.opened), 1);
        assert_eq!(SinkCounts::get(&h.counts.frames), 1);
    }

    #[test]
    fn fault_finalizes_once_after_grace() {
        let mut h = Harness::new();
        let t0 = Instant::now();
        h.start();
        h.step(unknown(), t0);

        let armed_at = t0 + Duration::from_millis(50);
        h.step(fault(), armed_at);
        h.step(fault(), armed_at + FAULT_GRACE - Duration::from_millis(1));
        assert!(h.runlog_lines().is_empty());
        assert!(h.state.lock().is_recording());

        h.step(fault(), armed_at + FAULT_GRACE);
        h.step(fault(), armed_at + FAULT_GRACE + Duration::from_secs(1));

        let lines = h.runlog_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(",fault,"));
        assert_eq!(h.replays(), ["fault-01.avi"]);
        assert!(!h.state.lock().is_recording());
        assert!(h.state.lock().run_request().is_none());
    }

    #[test]
    fn first_signal_wins() {
        let mut h = Harness::new();
        let t0 = Instant::now();
        h.start();
        h.step(unknown(), t0);

        h.step(distance(8_123), t0);
        h.step(fault(), t0 + Duration::from_secs(1));
        h.step(distance(9_999), t0 + Duration::from_secs(2));
        h.step(unknown(), t0 + SUCCESS_GRACE);

        let lines = h.runlog_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(",81.23,"));
        assert_eq!(h.replays(), ["08123-01.avi"]);
    }

    #[test]
    fn frames_keep_recording_until_deadline() {
        let mut h = Harness::new();
        let t0 = Instant::now();
        h.start();
        h.step(unknown(), t0);
        h.step(distance(100), t0);
        h.step(unknown(), t0 + Duration::from_secs(1));
        h.step(unknown(), t0 + SUCCESS_GRACE);

        assert_eq!(SinkCounts::get(&h.counts.frames), 4);
        assert_eq!(SinkCounts::get(&h.counts.finalized), 1);
    }

    #[test]
    fn kill_discards_session() {
        let mut h = Harness::new();
        let t0 = Instant::now();
        h.start();
        h.step(unknown(), t0);
        h.step(fault(), t0);

        assert!(h.kill());
        h.step(unknown(), t0 + Duration::from_secs(1));

        assert_eq!(SinkCounts::get(&h.counts.discarded), 1);
        assert!(h.replays().is_empty());
        assert!(h.runlog_lines().is_empty());
        assert!(!h.state.lock().in_flight());

        // The deadline of the killed session never fires.
        h.step(unknown(), t0 + FAULT_GRACE * 2);
        assert!(h.runlog_lines().is_empty());
    }

    #[test]
    fn kill_with_no_session_is_a_noop() {
        let mut h = Harness::new();
        assert!(!h.kill());
        h.step(unknown(), Instant::now());

        assert_eq!(SinkCounts::get(&h.counts.opened), 0);
        assert!(h.replays().is_empty());
        assert!(h.runlog_lines().is_empty());
    }

    #[test]
    fn kill_before_open_cancels_start() {
        let mut h = Harness::new();
        h.start();
        assert!(h.kill());
        h.step(unknown(), Instant::now());

        assert_eq!(SinkCounts::get(&h.counts.opened), 0);
        let guard = h.state.lock();
        assert!(!guard.in_flight());
        assert!(guard.run_request().is_none());
    }

    #[test]
    fn failed_encoder_clears_session_and_keeps_running() {
        let mut h = Harness::with_factory(CountingSinkFactory {
            fail_finalize: true,
            ..CountingSinkFactory::default()
        });
        let t0 = Instant::now();
        h.start();
        h.step(unknown(), t0);
        h.step(fault(), t0);
        h.step(unknown(), t0 + FAULT_GRACE);

        assert!(!h.state.lock().is_recording());
        assert!(h.runlog_lines().is_empty());
        // The unfinished temp file is kept.
        assert_eq!(h.replays().len(), 1);
        assert!(h.replays()[0].starts_with(".replay-"));

        h.start();
        h.step(unknown(), t0 + FAULT_GRACE);
        assert!(h.state.lock().is_recording());
    }

    #[test]
    fn at_most_one_session_under_any_interleaving() {
        let mut h = Harness::new();
        let mut now = Instant::now();
        let mut seed = 0x2545_f491_u32;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        for _ in 0..2_000 {
            match next() % 4 {
                0 => {
                    if !h.state.lock().in_flight() {
                        h.start();
                    }
                }
                1 => {
                    h.kill();
                }
                2 => now += Duration::from_secs(u64::from(next() % 12)),
                _ => {}
            }
            let classification = match next() % 3 {
                0 => fault(),
                1 => distance(next() % 10_000),
                _ => unknown(),
            };
            h.step(classification, now);

            assert!(h.counts.live() <= 1);
            assert_eq!(h.vision.session.is_some(), h.state.lock().is_recording());
        }

        let finalized = SinkCounts::get(&h.counts.finalized);
        let saved = h.replays().iter().filter(|n| !n.starts_with('.')).count();
        assert_eq!(h.runlog_lines().len(), finalized);
        assert_eq!(saved, finalized);
    }

    #[test]
    fn run_retries_not_ready_and_stops_when_closed() {
        let (_dir, recorder) = test_recorder(CountingSinkFactory::default());
        let state = Arc::new(SharedRunState::new());
        let source = ScriptedSource(VecDeque::from([
            Err(CaptureError::NotReady),
            Ok(Frame::filled(4, 3, 1)),
            Err(CaptureError::NotReady),
            Ok(Frame::filled(4, 3, 2)),
        ]));
        let vision = VisionLoop::new(
            Box::new(source),
            Box::new(PixelClassifier),
            Arc::clone(&state),
            recorder,
        );

        let result = vision.run();

        assert!(matches!(result, Err(CaptureError::Closed)));
        assert_eq!(state.lock().game_state(), GameState::Finished);
    }
}
