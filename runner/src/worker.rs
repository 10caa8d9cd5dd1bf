pub mod environment;
pub mod invocation;

use crate::{
    config::SweepConfig,
    sweep::params::{ArgumentLayout, ParameterError, ParameterSet},
    util::{exit_code, HOSTNAME},
};
use environment::{EnvironmentError, EnvironmentManager, Launcher};
use invocation::Invocation;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Invalid worker arguments")]
    Parameters(#[from] ParameterError),
    #[error("Failed to prepare the runtime environment")]
    Environment(#[from] EnvironmentError),
    #[error("Failed to start the analysis program")]
    Spawn(#[source] std::io::Error),
}

/// Run the analysis for one parameter set and return its exit code.
///
/// Setup errors are returned before the analysis is started, afterwards the exit code of the
/// analysis program is passed through as is.
#[instrument(skip(config, raw), level = "info")]
pub fn run(
    config: &SweepConfig,
    layout: ArgumentLayout,
    raw: &[String],
    dry_run: bool,
) -> Result<i32, WorkerError> {
    let parameters = ParameterSet::parse(layout, raw)?;
    let invocation = Invocation::analysis(&config.worker, layout, &parameters);

    if dry_run {
        println!("{invocation}");

        return Ok(0);
    }

    info!(host = %HOSTNAME.as_str(), "Starting worker");

    let launcher = if config.environment.enabled {
        let manager = EnvironmentManager::new(&config.environment);
        let check = manager.probe()?;
        debug!(check = ?check, "Probed environment");

        manager.setup(check)?
    } else {
        Launcher::Direct
    };

    let invocation = invocation.launched_by(&launcher);
    info!("Running {invocation}");

    let start = Instant::now();
    let status = invocation.command().status().map_err(|error| {
        error!(error = ?error, "Failed to start {}", invocation.program.to_string_lossy());

        WorkerError::Spawn(error)
    })?;
    let code = exit_code(status);

    if status.success() {
        info!(
            elapsed = ?start.elapsed(),
            host = %HOSTNAME.as_str(),
            "Analysis finished"
        );
    } else {
        warn!(
            elapsed = ?start.elapsed(),
            host = %HOSTNAME.as_str(),
            code = code,
            "Analysis failed"
        );
    }

    Ok(code)
}
