mod config;
mod executors;
mod sweep;
mod util;
mod worker;

use clap::{Parser, Subcommand};
use config::{ConfigErrors, SweepConfig};
use executors::{ExecutorError, Executors};
use std::{env, path::PathBuf, process::ExitCode};
use sweep::{job::WorkerCommand, params::ArgumentLayout};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use worker::WorkerError;

#[derive(Error, Debug)]
enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error("Failed to locate the worker program")]
    WorkerProgram(#[source] std::io::Error),
}

/// Submit parameter sweeps of the analysis to a grid engine and run the jobs
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit one job per parameter set of the sweep
    Submit {
        /// Sweep config, the built-in sweep is used without it
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override executor.name from the config (grid-engine, dry-run)
        #[arg(short, long)]
        executor: Option<String>,
    },
    /// Print the names of all jobs a sweep would submit
    Plan {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run the analysis for a single parameter set, this is what submitted jobs call
    Work {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Positional layout, defaults to the layout of the config
        #[arg(long, value_enum)]
        layout: Option<ArgumentLayout>,
        /// Print the analysis command instead of running it
        #[arg(long)]
        dry_run: bool,
        /// Parameter values in the order of the layout
        #[arg(required = true, allow_hyphen_values = true)]
        parameters: Vec<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command) {
        Ok(code) => util::to_exit_code(code),
        Err(error) => {
            error!(error = ?error, "{error}");

            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<i32, RunnerError> {
    match command {
        Commands::Submit { config, executor } => {
            let mut sweep_config = load_checked(config.as_ref())?;
            if let Some(executor) = executor {
                sweep_config.executor.name = executor;
            }

            let worker = worker_command(&sweep_config, config)?;
            let jobs = sweep::plan(&sweep_config, &worker)?;
            let report = Executors::load(&sweep_config)?.execute(&jobs)?;

            Ok(report.last_status)
        }
        Commands::Plan { config } => {
            let sweep_config = load_checked(config.as_ref())?;
            let worker = worker_command(&sweep_config, config)?;
            let jobs = sweep::plan(&sweep_config, &worker)?;

            for job in jobs.iter() {
                println!("{}", job.name);
            }
            info!("{} jobs in total", jobs.len());

            Ok(0)
        }
        Commands::Work {
            config,
            layout,
            dry_run,
            parameters,
        } => {
            let sweep_config = SweepConfig::load(config.as_deref())?;
            let layout = layout.unwrap_or(sweep_config.layout);

            Ok(worker::run(&sweep_config, layout, &parameters, dry_run)?)
        }
    }
}

fn load_checked(path: Option<&PathBuf>) -> Result<SweepConfig, ConfigErrors> {
    let config = SweepConfig::load(path.map(PathBuf::as_path))?;

    if config.preflight_checks() {
        Err(ConfigErrors::PreflightFailed)
    } else {
        Ok(config)
    }
}

/// the worker of submitted jobs is this very binary unless the config names another one
fn worker_command(config: &SweepConfig, path: Option<PathBuf>) -> Result<WorkerCommand, RunnerError> {
    let program = match config.worker.program {
        Some(ref program) => program.clone(),
        None => env::current_exe().map_err(RunnerError::WorkerProgram)?,
    };

    // jobs run with -cwd, a relative config path stays valid
    Ok(WorkerCommand {
        program,
        config: path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::ToggleMode;
    use sweep::params::{Literal, ParameterSet};

    /// every submitted command line has to parse back into the parameters it was built from
    fn assert_jobs_parse_back(config: &SweepConfig, worker: &WorkerCommand) {
        let jobs = sweep::plan(config, worker).unwrap();
        assert!(!jobs.is_empty());

        for job in jobs {
            let cli = Cli::try_parse_from(&job.command)
                .unwrap_or_else(|error| panic!("{} doesn't parse: {error}", job.name));

            match cli.command {
                Commands::Work {
                    config: path,
                    layout,
                    dry_run,
                    parameters,
                } => {
                    assert_eq!(path, worker.config);
                    assert_eq!(layout, Some(config.layout));
                    assert!(!dry_run);
                    assert_eq!(
                        ParameterSet::parse(config.layout, &parameters).unwrap(),
                        job.parameters,
                        "{}",
                        job.name
                    );
                }
                other => panic!("{} runs {other:?} instead of work", job.name),
            }
        }
    }

    #[test]
    fn built_in_jobs_parse_back_into_their_parameters() {
        let worker = WorkerCommand {
            program: PathBuf::from("/opt/sweep/sweep-runner"),
            config: None,
        };

        assert_jobs_parse_back(&SweepConfig::default(), &worker);
    }

    #[test]
    fn wind_ceiling_jobs_parse_back_into_their_parameters() {
        let mut config = SweepConfig::for_layout(ArgumentLayout::WindCeiling);
        config.axes.availability = ["0.90", "0.950"].map(Literal::from).to_vec();
        // a negative ceiling must not be taken for an option
        config.axes.wind_ceiling = Some(["-5", "0", "20000"].map(Literal::from).to_vec());
        config.toggles.mode = ToggleMode::Product;
        assert!(!config.preflight_checks());

        let worker = WorkerCommand {
            program: PathBuf::from("sweep-runner"),
            config: Some(PathBuf::from("sweeps/wind.yaml")),
        };

        assert_jobs_parse_back(&config, &worker);
    }
}
