use super::{submission_arguments, ExecutorError, SubmissionReport};
use crate::{config::SweepConfig, sweep::job::JobDescriptor};
use itertools::Itertools;
use std::path::PathBuf;
use tracing::info;

/// Executor that only prints the submission commands
#[derive(Clone, Debug)]
pub struct DryRunExecutor {
    submit_command: PathBuf,
}

impl DryRunExecutor {
    pub fn load(config: &SweepConfig) -> Self {
        Self {
            submit_command: config.executor.submit_command.clone(),
        }
    }

    pub fn render(&self, job: &JobDescriptor) -> String {
        std::iter::once(self.submit_command.to_string_lossy().into_owned())
            .chain(submission_arguments(job).into_iter().map(|argument| quote(&argument)))
            .join(" ")
    }

    pub fn execute(&mut self, jobs: &[JobDescriptor]) -> Result<SubmissionReport, ExecutorError> {
        let mut report = SubmissionReport::default();

        for job in jobs {
            println!("{}", self.render(job));
            report.record(0);
        }

        info!("Dry run, {} submissions were not sent", jobs.len());

        Ok(report)
    }
}

/// quote arguments containing shell metacharacters so the output can be pasted into a shell
fn quote(argument: &str) -> String {
    if argument
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./=:+,".contains(c))
    {
        argument.to_owned()
    } else {
        format!("'{}'", argument.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::{job::WorkerCommand, plan};

    #[test]
    fn host_list_is_quoted() {
        assert_eq!(quote("h=compute-6-*|compute-7-*"), "'h=compute-6-*|compute-7-*'");
        assert_eq!(quote("mem_free=150G"), "mem_free=150G");
    }

    #[test]
    fn renders_one_line_per_job() {
        let config = SweepConfig::default();
        let worker = WorkerCommand {
            program: PathBuf::from("sweep-runner"),
            config: None,
        };
        let jobs = plan(&config, &worker).unwrap();
        let executor = DryRunExecutor::load(&config);

        let line = executor.render(&jobs[0]);

        assert!(line.starts_with("qsub -N ncc3200_na0.95_tw -cwd -V"));
        assert!(line.ends_with("-- 3200 0.95 true false false false false"));
        assert!(!line.contains('\n'));
    }
}
