mod dry_run;
mod grid_engine;

use crate::{
    config::{ConfigErrors, SweepConfig},
    sweep::job::JobDescriptor,
};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to create output directory {path:?}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of submitting a sweep, the driver never learns how the jobs themselves went
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionReport {
    pub submitted: usize,
    pub failed: usize,
    /// exit code of the last submission command
    pub last_status: i32,
}

impl SubmissionReport {
    pub fn record(&mut self, status: i32) {
        if status == 0 {
            self.submitted += 1;
        } else {
            self.failed += 1;
        }

        self.last_status = status;
    }
}

#[derive(Clone, Debug)]
pub enum Executors {
    GridEngine(grid_engine::GridEngineExecutor),
    DryRun(dry_run::DryRunExecutor),
}

impl Executors {
    pub fn load(config: &SweepConfig) -> Result<Self, ConfigErrors> {
        match config.executor.name.as_str() {
            "grid-engine" | "sge" | "qsub" => Ok(Self::GridEngine(
                grid_engine::GridEngineExecutor::load(config),
            )),
            "dry-run" => Ok(Self::DryRun(dry_run::DryRunExecutor::load(config))),
            _ => Err(ConfigErrors::UnsupportedExecutor(config.executor.name.clone())),
        }
    }

    pub fn execute(&mut self, jobs: &[JobDescriptor]) -> Result<SubmissionReport, ExecutorError> {
        match self {
            Self::GridEngine(executor) => executor.execute(jobs),
            Self::DryRun(executor) => executor.execute(jobs),
        }
    }
}

/// Arguments of a single `qsub` call for `job`, the worker command goes last
pub fn submission_arguments(job: &JobDescriptor) -> Vec<String> {
    let streams = format!("{}/", job.output.to_string_lossy().trim_end_matches('/'));
    let resources = &job.resources;

    let mut arguments = vec![
        String::from("-N"),
        job.name.clone(),
        String::from("-cwd"),
        String::from("-V"),
        String::from("-o"),
        streams.clone(),
        String::from("-e"),
        streams,
        String::from("-l"),
        format!("h_rt={}", resources.wall_clock),
        String::from("-l"),
        format!("mem_free={}", resources.memory),
    ];

    if !resources.hosts.is_empty() {
        arguments.push(String::from("-l"));
        arguments.push(format!("h={}", resources.hosts.join("|")));
    }

    arguments.extend([
        String::from("-pe"),
        resources.parallel_environment.clone(),
        resources.slots.to_string(),
        // the worker is a binary, not a job script
        String::from("-b"),
        String::from("y"),
    ]);
    arguments.extend(job.command.iter().cloned());

    arguments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::{job::WorkerCommand, plan};

    fn first_job() -> JobDescriptor {
        let worker = WorkerCommand {
            program: PathBuf::from("/opt/sweep/sweep-runner"),
            config: None,
        };

        plan(&SweepConfig::default(), &worker)
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
    }

    #[test]
    fn qsub_arguments_request_fixed_resources() {
        let arguments = submission_arguments(&first_job());

        assert_eq!(
            arguments,
            [
                "-N",
                "ncc3200_na0.95_tw",
                "-cwd",
                "-V",
                "-o",
                "hpc_output/",
                "-e",
                "hpc_output/",
                "-l",
                "h_rt=12:00:00",
                "-l",
                "mem_free=150G",
                "-l",
                "h=compute-6-*|compute-7-*",
                "-pe",
                "smp",
                "8",
                "-b",
                "y",
                "/opt/sweep/sweep-runner",
                "work",
                "--layout",
                "extended",
                "--",
                "3200",
                "0.95",
                "true",
                "false",
                "false",
                "false",
                "false",
            ]
        );
    }

    #[test]
    fn host_restriction_is_optional() {
        let mut job = first_job();
        job.resources.hosts.clear();

        let arguments = submission_arguments(&job);

        assert!(!arguments.iter().any(|argument| argument.starts_with("h=")));
    }

    #[test]
    fn report_tracks_last_status() {
        let mut report = SubmissionReport::default();
        report.record(0);
        report.record(2);
        report.record(0);

        assert_eq!(
            report,
            SubmissionReport {
                submitted: 2,
                failed: 1,
                last_status: 0
            }
        );
    }

    #[test]
    fn unknown_executor_is_rejected() {
        let mut config = SweepConfig::default();
        config.executor.name = String::from("slurm");

        assert!(matches!(
            Executors::load(&config),
            Err(ConfigErrors::UnsupportedExecutor(name)) if name == "slurm"
        ));
    }
}
