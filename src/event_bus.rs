//! Event bus: operator lines and device lines merged into one ordered queue.
//!
//! Each producer runs on its own thread and blocks only on its input. The
//! dispatcher is the single consumer. Order is preserved per producer; lines
//! from different producers interleave in arrival order.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

/// One message on the bus, tagged by origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A line typed by the operator.
    Console(String),

    /// A line echoed by the device.
    Device(String),

    /// The device link is gone.
    Disconnected(String),

    /// The operator closed the console.
    Shutdown,
}

/// Creates a connected publisher/bus pair.
pub fn event_bus() -> (Publisher, EventBus) {
    let (tx, rx) = mpsc::channel();
    (Publisher(tx), EventBus(rx))
}

/// Producer handle. Cheap to clone, one per producer thread.
#[derive(Debug, Clone)]
pub struct Publisher(Sender<Event>);

impl Publisher {
    /// Posts an event. Returns `false` once the bus has been dropped.
    pub fn publish(&self, event: Event) -> bool {
        self.0.send(event).is_ok()
    }
}

/// Consumer end of the bus.
#[derive(Debug)]
pub struct EventBus(Receiver<Event>);

impl EventBus {
    /// Blocks until the next event. Once every publisher is gone this is `Shutdown`.
    pub fn next(&self) -> Event {
        self.0.recv().unwrap_or(Event::Shutdown)
    }
}

/// Spawns the console reader.
///
/// Forwards each trimmed line. Stops after forwarding `q`, or posts
/// [`Event::Shutdown`] at end of input.
pub fn spawn_console_reader<R>(input: R, publisher: Publisher) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("console-reader".into())
        .spawn(move || read_console(input, &publisher))
}

fn read_console(mut input: impl BufRead, publisher: &Publisher) {
    let mut line = String::new();
    loop {
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let cmd = line.trim().to_string();
                let quit = cmd == "q";
                if !publisher.publish(Event::Console(cmd)) || quit {
                    return;
                }
            }
            Err(e) => {
                warn!("console read failed: {e}");
                break;
            }
        }
    }
    debug!("console closed");
    publisher.publish(Event::Shutdown);
}

/// Spawns the device reader.
///
/// Forwards each line from the device until the link fails, then posts
/// [`Event::Disconnected`]. Invalid UTF-8 is replaced rather than dropped.
pub fn spawn_device_reader<R>(input: R, publisher: Publisher) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("device-reader".into())
        .spawn(move || read_device(input, &publisher))
}

fn read_device(mut input: impl BufRead, publisher: &Publisher) {
    let mut buf = Vec::new();
    let reason = loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => break "device closed the connection".to_string(),
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if !publisher.publish(Event::Device(line)) {
                    return;
                }
            }
            Err(e) => break format!("device read failed: {e}"),
        }
    };
    publisher.publish(Event::Disconnected(reason));
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    fn drain(bus: &EventBus, n: usize) -> Vec<Event> {
        (0..n).map(|_| bus.next()).collect()
    }

    #[test]
    fn console_lines_are_trimmed_and_end_with_shutdown() {
        let (publisher, bus) = event_bus();
        let input = Cursor::new("w\n  r -1,500,30,55,55,0,400 \n\n");

        spawn_console_reader(input, publisher).unwrap().join().unwrap();

        assert_eq!(
            drain(&bus, 4),
            vec![
                Event::Console("w".into()),
                Event::Console("r -1,500,30,55,55,0,400".into()),
                Event::Console(String::new()),
                Event::Shutdown,
            ]
        );
    }

    #[test]
    fn console_stops_after_quit() {
        let (publisher, bus) = event_bus();
        let input = Cursor::new("q\nw\n");

        spawn_console_reader(input, publisher).unwrap().join().unwrap();

        assert_eq!(bus.next(), Event::Console("q".into()));
        // Publisher dropped with the thread; nothing else was sent.
        assert_eq!(bus.next(), Event::Shutdown);
    }

    #[test]
    fn device_lines_then_disconnect() {
        let (publisher, bus) = event_bus();
        let input = Cursor::new(b"ready\r\nrun done\n".to_vec());

        spawn_device_reader(input, publisher).unwrap().join().unwrap();

        assert_eq!(bus.next(), Event::Device("ready".into()));
        assert_eq!(bus.next(), Event::Device("run done".into()));
        assert!(matches!(bus.next(), Event::Disconnected(_)));
    }

    #[test]
    fn producers_interleave_in_one_queue() {
        let (publisher, bus) = event_bus();
        publisher.publish(Event::Device("a".into()));
        publisher.publish(Event::Console("w".into()));
        publisher.publish(Event::Device("b".into()));

        assert_eq!(
            drain(&bus, 3),
            vec![
                Event::Device("a".into()),
                Event::Console("w".into()),
                Event::Device("b".into()),
            ]
        );
    }
}
