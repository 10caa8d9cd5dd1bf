use super::{submission_arguments, ExecutorError, SubmissionReport};
use crate::{config::SweepConfig, sweep::job::JobDescriptor, util::exit_code};
use std::{fs, path::PathBuf, process::Command};
use tracing::{debug, error, info, instrument, warn};

/// exit code a shell reports when the command can't be started
const SPAWN_FAILED: i32 = 127;

/// Executor that hands every job to a grid engine through `qsub`
#[derive(Clone, Debug)]
pub struct GridEngineExecutor {
    submit_command: PathBuf,
    output: PathBuf,
}

impl GridEngineExecutor {
    pub fn load(config: &SweepConfig) -> Self {
        Self {
            submit_command: config.executor.submit_command.clone(),
            output: config.output.clone(),
        }
    }

    /// Submit all jobs in order, a failed submission doesn't stop the sweep
    #[instrument(skip_all, level = "info")]
    pub fn execute(&mut self, jobs: &[JobDescriptor]) -> Result<SubmissionReport, ExecutorError> {
        // the scheduler won't create the stream directory, nothing is submitted without it
        fs::create_dir_all(&self.output).map_err(|source| ExecutorError::OutputDirectory {
            path: self.output.clone(),
            source,
        })?;

        let mut report = SubmissionReport::default();
        let total = jobs.len();

        for (index, job) in jobs.iter().enumerate() {
            let arguments = submission_arguments(job);
            debug!(
                name = %job.name,
                parameters = ?job.parameters,
                arguments = ?arguments,
                "Submitting job"
            );

            let status = match Command::new(&self.submit_command).args(&arguments).status() {
                Ok(status) if status.success() => 0,
                Ok(status) => {
                    warn!(name = %job.name, status = ?status, "Submission was rejected");
                    exit_code(status)
                }
                Err(error) => {
                    error!(
                        name = %job.name,
                        error = ?error,
                        "Failed to run {}: {error}",
                        self.submit_command.to_string_lossy()
                    );
                    SPAWN_FAILED
                }
            };

            report.record(status);
            info!("Submitted {}/{total}", index + 1);
        }

        if report.failed > 0 {
            warn!(
                "{} of {total} submissions failed, the exit status is the one of the last submission",
                report.failed
            );
        }
        info!(
            submitted = report.submitted,
            failed = report.failed,
            "Done with submitting"
        );

        Ok(report)
    }
}
