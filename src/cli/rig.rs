//! Wiring the hardware: serial link, camera, classifier, recorder, and the
//! vision loop thread.

use std::fs::File;
use std::io::BufReader;
use std::process;
use std::sync::Arc;
use std::thread;

use tracing::{error, info};

use crate::config::Config;
use crate::event_bus::{self, Event, EventBus, Publisher};
use crate::monitor::SharedRunState;
use crate::recording::{FfmpegSinkFactory, Recorder};
use crate::runlog::Runlog;
use crate::transport::{LineWriter, SerialPort};
use crate::vision::{FfmpegCapture, Preview, SnapshotPreview, TemplateClassifier};
use crate::vision_loop::VisionLoop;

use super::RigArgs;

/// An open rig with the vision loop already running.
pub(super) struct Rig {
    pub state: Arc<SharedRunState>,
    pub transport: LineWriter<File>,
    pub device: BufReader<File>,
}

impl Rig {
    pub fn open(config: &Config, args: &RigArgs) -> Result<Self, String> {
        let runlog = Runlog::new(&args.out_dir)
            .map_err(|e| format!("failed to prepare {}: {e}", args.out_dir.display()))?;
        info!("Runlog: {}", runlog.path().display());

        let classifier = TemplateClassifier::load(&config.detect).map_err(|e| e.to_string())?;

        let port = SerialPort::open(&args.port, config.serial.baud, &config.serial.stty)
            .map_err(|e| format!("failed to open {}: {e}", args.port.display()))?;
        let (transport, device) = port
            .split()
            .map_err(|e| format!("failed to open {}: {e}", args.port.display()))?;

        let capture = FfmpegCapture::spawn(&args.video_device, &config.video).map_err(|e| {
            format!("failed to open {}: {e}", args.video_device.display())
        })?;

        let state = Arc::new(SharedRunState::new());
        let recorder = Recorder::new(
            Box::new(FfmpegSinkFactory::new(&config.video)),
            runlog,
            &config.recording,
        );
        let mut vision = VisionLoop::new(
            Box::new(capture),
            Box::new(classifier),
            Arc::clone(&state),
            recorder,
        );
        if let Some(path) = &args.preview {
            let preview: Box<dyn Preview> =
                Box::new(SnapshotPreview::new(path.clone(), config.video.fps));
            vision = vision.with_preview(preview);
        }
        spawn_vision_loop(vision)?;

        Ok(Self {
            state,
            transport,
            device,
        })
    }
}

/// Runs the vision loop on its own thread. The process cannot continue
/// without it, so a failure exits.
fn spawn_vision_loop(vision: VisionLoop) -> Result<(), String> {
    thread::Builder::new()
        .name("vision-loop".into())
        .spawn(move || {
            if let Err(e) = vision.run() {
                error!("Vision loop stopped: {e}");
                process::exit(1);
            }
        })
        .map(drop)
        .map_err(|e| format!("failed to start vision loop: {e}"))
}

pub(super) fn spawn_device_reader(
    device: BufReader<File>,
    publisher: Publisher,
) -> Result<(), String> {
    event_bus::spawn_device_reader(device, publisher)
        .map(drop)
        .map_err(|e| format!("failed to start device reader: {e}"))
}

/// Echoes device lines in continuous mode, where nothing else reads the bus.
/// A lost device exits the process.
pub(super) fn spawn_device_monitor(bus: EventBus) -> Result<(), String> {
    thread::Builder::new()
        .name("device-monitor".into())
        .spawn(move || {
            loop {
                match bus.next() {
                    Event::Device(line) => info!("device: {line}"),
                    Event::Disconnected(reason) => {
                        error!("Device disconnected: {reason}");
                        process::exit(1);
                    }
                    Event::Console(_) => {}
                    Event::Shutdown => break,
                }
            }
        })
        .map(drop)
        .map_err(|e| format!("failed to start device monitor: {e}"))
}
