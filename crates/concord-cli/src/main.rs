#![doc = include_str!("../README.md")]

mod app;

use app::config::{CliArgs, Config};
use app::telemetry::init_telemetry;
use clap::Parser;
use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = Config::try_from(args)?;

    init_telemetry()?;
    app::run(config)
}
