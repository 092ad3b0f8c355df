//! The command dispatcher: drains the event bus and drives the device.
//!
//! Device lines are echoed. Console lines are parsed against the operator
//! grammar and turned into transport writes and run-state directives.
//! Anything that would move the game is refused while a recording is in
//! flight; the operator has to kill it first.

use std::io;
use std::sync::Arc;

use tracing::{info, warn};

use crate::event_bus::{Event, EventBus};
use crate::model::{Command, GameState, RunRequest};
use crate::monitor::SharedRunState;
use crate::transport::Transport;

/// The advance command: fire moves the game past a result or retry screen.
const ADVANCE: &str = "f";

/// Errors that stop the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("device disconnected: {0}")]
    Disconnected(String),

    #[error("failed to write to device: {0}")]
    Transport(#[from] io::Error),
}

/// Whether to keep draining the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Drives the game back to the ready screen.
///
/// Blocks on the run-state notification until the vision loop reports
/// [`GameState::ReadyToRun`]. Each newly seen finished or try-again screen
/// gets one advance command; unknown screens are waited out. The monitor is
/// released while the command is written.
pub fn prepare_for_run(state: &SharedRunState, transport: &mut dyn Transport) -> io::Result<()> {
    let mut last_seen = None;
    loop {
        let screen = {
            let mut guard = state.lock();
            loop {
                let current = guard.game_state();
                if current == GameState::ReadyToRun {
                    return Ok(());
                }
                if current.needs_advance() && last_seen != Some(current) {
                    break current;
                }
                last_seen = Some(current);
                guard = guard.wait();
            }
        };
        transport.send_line(ADVANCE)?;
        last_seen = Some(screen);
    }
}

/// The control loop for interactive mode.
pub struct Dispatcher<T> {
    state: Arc<SharedRunState>,
    transport: T,
    last_run: Option<RunRequest>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(state: Arc<SharedRunState>, transport: T) -> Self {
        Self {
            state,
            transport,
            last_run: None,
        }
    }

    /// Handles events until the console closes or the device goes away.
    pub fn run(&mut self, bus: &EventBus) -> Result<(), DispatchError> {
        while self.handle(bus.next())? == Flow::Continue {}
        Ok(())
    }

    /// Handles one event.
    pub fn handle(&mut self, event: Event) -> Result<Flow, DispatchError> {
        match event {
            Event::Device(line) => {
                info!("device: {line}");
                Ok(Flow::Continue)
            }
            Event::Console(line) => self.handle_console(&line),
            Event::Disconnected(reason) => Err(DispatchError::Disconnected(reason)),
            Event::Shutdown => {
                self.kill_in_flight();
                Ok(Flow::Stop)
            }
        }
    }

    fn handle_console(&mut self, line: &str) -> Result<Flow, DispatchError> {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Flow::Continue),
            Err(e) => {
                warn!("{e}");
                return Ok(Flow::Continue);
            }
        };

        if command.drives_device() && self.state.lock().in_flight() {
            warn!("Recording in progress; kill it first (k)");
            return Ok(Flow::Continue);
        }

        match command {
            Command::Input(c) => self.transport.send_line(c.encode_utf8(&mut [0; 4]))?,
            Command::Run(params) => self.start_run(RunRequest::new(params))?,
            Command::Repeat => match self.last_run.clone() {
                Some(request) => self.start_run(request)?,
                None => warn!("No last command to repeat"),
            },
            Command::Prepare => prepare_for_run(&self.state, &mut self.transport)?,
            Command::Kill => {
                if self.state.lock().request_kill() {
                    info!("Killing recording");
                } else {
                    warn!("Nothing to kill");
                }
            }
            Command::Quit => {
                self.kill_in_flight();
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    /// Kills any recording in flight and waits until the vision loop has
    /// dropped it, so no partial replay is left behind on exit.
    fn kill_in_flight(&self) {
        let mut guard = self.state.lock();
        if !guard.request_kill() {
            return;
        }
        info!("Killing recording before exit");
        while guard.in_flight() {
            guard = guard.wait();
        }
    }

    /// Readies the game, posts the start directive, and sends the run line.
    fn start_run(&mut self, request: RunRequest) -> io::Result<()> {
        prepare_for_run(&self.state, &mut self.transport)?;
        let line = request.device_line();
        self.state.lock().request_start(request.clone());
        self.transport.send_line(&line)?;
        self.last_run = Some(request);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::sync::mpsc::{self, Receiver, Sender};
    use std::thread;
    use std::time::Duration;

    /// A transport that forwards every line to a channel.
    pub(crate) struct ChannelTransport(pub Sender<String>);

    impl Transport for ChannelTransport {
        fn send_line(&mut self, line: &str) -> io::Result<()> {
            self.0
                .send(line.to_string())
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    pub(crate) fn channel_transport() -> (ChannelTransport, Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        (ChannelTransport(tx), rx)
    }

    fn sent(rx: &Receiver<String>) -> Vec<String> {
        rx.try_iter().collect()
    }

    fn ready_dispatcher() -> (Dispatcher<ChannelTransport>, Receiver<String>) {
        let state = Arc::new(SharedRunState::new());
        state.lock().observe(GameState::ReadyToRun);
        let (transport, rx) = channel_transport();
        (Dispatcher::new(state, transport), rx)
    }

    fn console(line: &str) -> Event {
        Event::Console(line.into())
    }

    fn next_line(rx: &Receiver<String>) -> String {
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    /// A transport whose writes stall until released.
    struct StalledTransport {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl Transport for StalledTransport {
        fn send_line(&mut self, _line: &str) -> io::Result<()> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Ok(())
        }
    }

    #[test]
    fn prepare_returns_at_once_when_ready() {
        let state = SharedRunState::new();
        state.lock().observe(GameState::ReadyToRun);
        let (mut transport, rx) = channel_transport();

        prepare_for_run(&state, &mut transport).unwrap();
        assert!(sent(&rx).is_empty());
    }

    #[test]
    fn prepare_advances_once_per_distinct_screen() {
        let state = Arc::new(SharedRunState::new());
        state.lock().observe(GameState::Finished);
        let (mut transport, rx) = channel_transport();

        let preparing = {
            let state = Arc::clone(&state);
            thread::spawn(move || prepare_for_run(&state, &mut transport))
        };

        assert_eq!(next_line(&rx), "f");
        // A wakeup on the same screen sends nothing more.
        state.lock().observe(GameState::Finished);
        state.lock().end_session();
        state.lock().observe(GameState::TryAgain);
        assert_eq!(next_line(&rx), "f");
        state.lock().observe(GameState::ReadyToRun);

        preparing.join().unwrap().unwrap();
        assert!(sent(&rx).is_empty());
    }

    #[test]
    fn prepare_waits_out_unknown_screens() {
        let state = Arc::new(SharedRunState::new());
        let (mut transport, rx) = channel_transport();

        let preparing = {
            let state = Arc::clone(&state);
            thread::spawn(move || prepare_for_run(&state, &mut transport))
        };
        state.lock().observe(GameState::ReadyToRun);

        preparing.join().unwrap().unwrap();
        assert!(sent(&rx).is_empty());
    }

    #[test]
    fn prepare_releases_monitor_while_writing() {
        let state = Arc::new(SharedRunState::new());
        state.lock().observe(GameState::Finished);
        let (entered_tx, entered) = mpsc::channel();
        let (release, release_rx) = mpsc::channel();
        let mut transport = StalledTransport {
            entered: entered_tx,
            release: release_rx,
        };

        let preparing = {
            let state = Arc::clone(&state);
            thread::spawn(move || prepare_for_run(&state, &mut transport))
        };
        entered.recv_timeout(Duration::from_secs(5)).unwrap();

        // The write is stalled; the vision side must still get through.
        let (observed_tx, observed) = mpsc::channel();
        {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                state.lock().observe(GameState::ReadyToRun);
                let _ = observed_tx.send(());
            });
        }
        let got_through = observed.recv_timeout(Duration::from_secs(1)).is_ok();

        release.send(()).unwrap();
        preparing.join().unwrap().unwrap();
        assert!(got_through);
    }

    #[test]
    fn device_lines_are_not_commands() {
        let (mut dispatcher, rx) = ready_dispatcher();

        let flow = dispatcher.handle(Event::Device("q".into())).unwrap();
        assert_eq!(flow, Flow::Continue);
        assert!(sent(&rx).is_empty());
    }

    #[test]
    fn inputs_are_forwarded() {
        let (mut dispatcher, rx) = ready_dispatcher();

        for c in ["w", "s", "a", "d", "f"] {
            dispatcher.handle(console(c)).unwrap();
        }
        assert_eq!(sent(&rx), ["w", "s", "a", "d", "f"]);
    }

    #[test]
    fn run_posts_start_and_sends_line() {
        let (mut dispatcher, rx) = ready_dispatcher();

        dispatcher.handle(console("r -1,500,30,55,55,0,400")).unwrap();

        assert_eq!(sent(&rx), ["r -1,500,30,55,55,0,400"]);
        let guard = dispatcher.state.lock();
        assert!(guard.in_flight());
        assert_eq!(
            guard.run_request().map(|r| r.params.as_str()),
            Some("-1,500,30,55,55,0,400")
        );
    }

    #[test]
    fn motion_is_rejected_while_recording() {
        let (mut dispatcher, rx) = ready_dispatcher();
        {
            let mut guard = dispatcher.state.lock();
            guard.request_start(RunRequest::new("-1,500,30,55,55,0,400"));
            guard.take_directive();
            guard.begin_session();
        }

        for line in ["w", "f", "r -1,500,30,55,55,0,400", "l", "p"] {
            let flow = dispatcher.handle(console(line)).unwrap();
            assert_eq!(flow, Flow::Continue);
        }
        assert!(sent(&rx).is_empty());
    }

    #[test]
    fn motion_is_rejected_while_start_is_pending() {
        let (mut dispatcher, rx) = ready_dispatcher();
        dispatcher.handle(console("r -1,500,30,55,55,0,400")).unwrap();
        sent(&rx);

        dispatcher.handle(console("d")).unwrap();
        assert!(sent(&rx).is_empty());
    }

    #[test]
    fn repeat_without_history_sends_nothing() {
        let (mut dispatcher, rx) = ready_dispatcher();

        dispatcher.handle(console("l")).unwrap();
        assert!(sent(&rx).is_empty());
        assert!(!dispatcher.state.lock().in_flight());
    }

    #[test]
    fn repeat_reissues_last_run() {
        let (mut dispatcher, rx) = ready_dispatcher();
        dispatcher.handle(console("r -1,500,30,55,55,0,400")).unwrap();
        dispatcher.state.lock().end_session();

        dispatcher.handle(console("l")).unwrap();
        assert_eq!(
            sent(&rx),
            ["r -1,500,30,55,55,0,400", "r -1,500,30,55,55,0,400"]
        );
        assert!(dispatcher.state.lock().in_flight());
    }

    #[test]
    fn kill_is_allowed_while_recording() {
        let (mut dispatcher, rx) = ready_dispatcher();
        dispatcher.handle(console("r -1,500,30,55,55,0,400")).unwrap();

        dispatcher.handle(console("k")).unwrap();

        assert_eq!(sent(&rx), ["r -1,500,30,55,55,0,400"]);
        let mut guard = dispatcher.state.lock();
        assert_eq!(
            guard.take_directive(),
            Some(crate::monitor::Directive::Kill)
        );
    }

    #[test]
    fn kill_with_nothing_in_flight_posts_nothing() {
        let (mut dispatcher, _rx) = ready_dispatcher();

        dispatcher.handle(console("k")).unwrap();
        assert_eq!(dispatcher.state.lock().take_directive(), None);
    }

    #[test]
    fn bad_input_is_not_fatal() {
        let (mut dispatcher, rx) = ready_dispatcher();

        for line in ["x", "r 1,2,3", "ww", ""] {
            assert_eq!(dispatcher.handle(console(line)).unwrap(), Flow::Continue);
        }
        assert!(sent(&rx).is_empty());
        assert!(!dispatcher.state.lock().in_flight());
    }

    #[test]
    fn quit_and_shutdown_stop() {
        let (mut dispatcher, _rx) = ready_dispatcher();

        assert_eq!(dispatcher.handle(console("q")).unwrap(), Flow::Stop);
        assert_eq!(dispatcher.handle(Event::Shutdown).unwrap(), Flow::Stop);
    }

    #[test]
    fn quit_kills_open_recording_first() {
        let (mut dispatcher, _rx) = ready_dispatcher();
        dispatcher.handle(console("r -1,500,30,55,55,0,400")).unwrap();
        {
            let mut guard = dispatcher.state.lock();
            guard.take_directive();
            guard.begin_session();
        }

        // Stands in for the vision loop, which polls the mailbox per frame.
        let vision = {
            let state = Arc::clone(&dispatcher.state);
            thread::spawn(move || {
                let mut guard = state.lock();
                while guard.take_directive() != Some(crate::monitor::Directive::Kill) {
                    (guard, _) = guard.wait_timeout(Duration::from_millis(5));
                }
                guard.end_session();
            })
        };

        assert_eq!(dispatcher.handle(console("q")).unwrap(), Flow::Stop);
        vision.join().unwrap();
        assert!(!dispatcher.state.lock().in_flight());
    }

    #[test]
    fn shutdown_drops_pending_start() {
        let (mut dispatcher, _rx) = ready_dispatcher();
        dispatcher.handle(console("r -1,500,30,55,55,0,400")).unwrap();

        assert_eq!(dispatcher.handle(Event::Shutdown).unwrap(), Flow::Stop);
        let mut guard = dispatcher.state.lock();
        assert_eq!(
            guard.take_directive(),
            Some(crate::monitor::Directive::Kill)
        );
    }

    #[test]
    fn disconnect_is_fatal() {
        let (mut dispatcher, _rx) = ready_dispatcher();

        let err = dispatcher
            .handle(Event::Disconnected("device closed the connection".into()))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Disconnected(_)));
    }

    #[test]
    fn transport_failure_is_fatal() {
        let (mut dispatcher, rx) = ready_dispatcher();
        drop(rx);

        let err = dispatcher.handle(console("w")).unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }

    #[test]
    fn run_drains_until_quit() {
        let (mut dispatcher, rx) = ready_dispatcher();
        let (publisher, bus) = crate::event_bus::event_bus();
        for event in [console("w"), Event::Device("ok".into()), console("q"), console("a")] {
            publisher.publish(event);
        }

        dispatcher.run(&bus).unwrap();
        assert_eq!(sent(&rx), ["w"]);
    }
}
