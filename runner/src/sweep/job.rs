use super::params::{ArgumentLayout, ParameterError, ParameterSet, Toggle};
use crate::config::{ResourceConfig, SweepConfig};
use std::path::PathBuf;

/// Everything the scheduler needs to run one parameter set
#[derive(Clone, Debug)]
pub struct JobDescriptor {
    pub name: String,
    pub parameters: ParameterSet,
    pub resources: ResourceConfig,
    pub output: PathBuf,
    /// worker program followed by its arguments
    pub command: Vec<String>,
}

/// How submitted jobs call back into the worker
#[derive(Clone, Debug)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub config: Option<PathBuf>,
}

impl WorkerCommand {
    pub fn arguments(
        &self,
        layout: ArgumentLayout,
        parameters: &ParameterSet,
    ) -> Result<Vec<String>, ParameterError> {
        let mut command = vec![
            self.program.to_string_lossy().into_owned(),
            String::from("work"),
            String::from("--layout"),
            layout.to_string(),
        ];

        if let Some(ref config) = self.config {
            command.push(String::from("--config"));
            command.push(config.to_string_lossy().into_owned());
        }

        // literals may start with '-'
        command.push(String::from("--"));
        command.extend(parameters.render(layout)?);

        Ok(command)
    }
}

impl JobDescriptor {
    pub fn new(
        parameters: ParameterSet,
        config: &SweepConfig,
        worker: &WorkerCommand,
    ) -> Result<Self, ParameterError> {
        Ok(Self {
            name: job_name(&parameters),
            command: worker.arguments(config.layout, &parameters)?,
            resources: config.resources.clone(),
            output: config.output.clone(),
            parameters,
        })
    }
}

/// Encode every value of a parameter set into a job name.
///
/// Each field has its own prefix and literals never contain '_', so two different
/// parameter sets can't end up with the same name.
pub fn job_name(parameters: &ParameterSet) -> String {
    let mut name = format!(
        "ncc{}_na{}",
        parameters.capital_cost, parameters.availability
    );

    if let Some(ref wind_ceiling) = parameters.wind_ceiling {
        name.push_str(&format!("_w{wind_ceiling}"));
    }

    name.push_str("_t");
    if parameters.toggles.is_empty() {
        name.push_str("none");
    } else {
        name.extend(parameters.toggles.iter().copied().map(Toggle::letter));
    }

    name
}
