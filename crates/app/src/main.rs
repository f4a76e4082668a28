mod cli;
mod config;
mod monitor;
mod run;
mod sink;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use crate::{cli::CliArgs, config::RunConfig};

fn main() {
    if let Err(err) = try_main() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let config = RunConfig::try_from(CliArgs::parse())?;
    let _telemetry = telemetry::enter_runtime(&config.telemetry);
    if config.telemetry.metrics_out.is_some() {
        telemetry::init_metrics_recorder()?;
    }

    let outcome = run::run(&config);

    if let Some(path) = &config.telemetry.metrics_out {
        if let Err(err) = telemetry::write_metrics(path) {
            warn!("{err:#}");
        }
    }

    let summary = outcome?;
    info!(
        frames = summary.report.frames,
        failed = summary.report.failed,
        placeholders = summary.placeholders,
        "done"
    );
    Ok(())
}
