mod autopilot;
mod cli;
mod config;
mod dispatcher;
mod event_bus;
mod model;
mod monitor;
mod recording;
mod runlog;
mod transport;
mod vision;
mod vision_loop;

use std::process;

use clap::Parser;

use cli::Cli;
use config::Config;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = cli::run(cli, &config) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
