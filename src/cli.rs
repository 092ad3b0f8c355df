//! CLI interface for javelin.
//!
//! Two modes share one rig (serial link, camera, recorder):
//!
//! - `javelin interactive`: the operator types commands on stdin.
//! - `javelin auto`: attempts run unattended with random parameters.

mod rig;

use std::io::{self, BufReader};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::autopilot::Autopilot;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::event_bus::{event_bus, spawn_console_reader};

/// javelin: run and record THEC64 javelin throws.
#[derive(Debug, Parser)]
#[command(name = "javelin", version, after_long_help = CONSOLE_HELP)]
pub struct Cli {
    /// Config file (default: ~/.javelin/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

const CONSOLE_HELP: &str = r"Interactive commands:
  w, s, a, d, f     joystick up/down/left/right, fire
  r <params>        record a run, e.g. r -1,500,30,55,55,0,400
  l                 repeat the last run
  p                 drive the game back to the practice screen
  k                 kill the current recording
  q                 quit

Run params: initial-fire-ms (-1 = none), initial-skip-ms, steps,
  step-press-ms, step-skip-ms, pre-throw-skip-ms, throw-press-ms";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Drive the game from the console and record each run.
    Interactive {
        #[command(flatten)]
        rig: RigArgs,
    },

    /// Run attempts unattended with random run parameters.
    Auto {
        #[command(flatten)]
        rig: RigArgs,

        /// Stop after this many attempts (default: run forever).
        #[arg(long)]
        attempts: Option<u32>,
    },
}

/// Hardware and output locations.
#[derive(Debug, Args)]
pub struct RigArgs {
    /// Serial device of the controller board (e.g. `/dev/ttyUSB0`).
    #[arg(short, long)]
    pub port: PathBuf,

    /// V4L2 capture device (e.g. `/dev/video0`).
    #[arg(short = 'd', long)]
    pub video_device: PathBuf,

    /// Directory for `runlog.csv` and `replays/`.
    #[arg(short, long)]
    pub out_dir: PathBuf,

    /// Refresh this PNG with the live picture once per second.
    #[arg(long)]
    pub preview: Option<PathBuf>,
}

/// Run the CLI, returning an error message on failure.
pub fn run(cli: Cli, config: &Config) -> Result<(), String> {
    match cli.command {
        Command::Interactive { rig } => cmd_interactive(config, &rig),
        Command::Auto { rig, attempts } => cmd_auto(config, &rig, attempts),
    }
}

fn cmd_interactive(config: &Config, args: &RigArgs) -> Result<(), String> {
    let rig = rig::Rig::open(config, args)?;
    let (publisher, bus) = event_bus();
    rig::spawn_device_reader(rig.device, publisher.clone())?;
    spawn_console_reader(BufReader::new(io::stdin()), publisher)
        .map_err(|e| format!("failed to start console reader: {e}"))?;

    let mut dispatcher = Dispatcher::new(rig.state, rig.transport);
    dispatcher.run(&bus).map_err(|e| e.to_string())
}

fn cmd_auto(config: &Config, args: &RigArgs, attempts: Option<u32>) -> Result<(), String> {
    let rig = rig::Rig::open(config, args)?;
    let (publisher, bus) = event_bus();
    rig::spawn_device_reader(rig.device, publisher)?;
    rig::spawn_device_monitor(bus)?;

    let mut autopilot = Autopilot::new(rig.state, rig.transport, config.recording.max_duration());
    autopilot.run(attempts).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_interactive() {
        let cli = Cli::try_parse_from([
            "javelin",
            "interactive",
            "-p",
            "/dev/ttyUSB0",
            "-d",
            "/dev/video0",
            "-o",
            "out",
        ])
        .unwrap();

        let Command::Interactive { rig } = cli.command else {
            panic!("expected interactive");
        };
        assert_eq!(rig.port, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(rig.video_device, PathBuf::from("/dev/video0"));
        assert_eq!(rig.out_dir, PathBuf::from("out"));
        assert!(rig.preview.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn parses_auto_with_global_config() {
        let cli = Cli::try_parse_from([
            "javelin",
            "auto",
            "--port",
            "/dev/ttyUSB0",
            "--video-device",
            "/dev/video0",
            "--out-dir",
            "out",
            "--attempts",
            "5",
            "--config",
            "rig.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("rig.toml")));
        let Command::Auto { attempts, .. } = cli.command else {
            panic!("expected auto");
        };
        assert_eq!(attempts, Some(5));
    }

    #[test]
    fn port_is_required() {
        let err = Cli::try_parse_from(["javelin", "interactive", "-d", "/dev/video0", "-o", "out"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
