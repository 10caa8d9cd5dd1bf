use super::environment::Launcher;
use crate::{
    config::WorkerConfig,
    sweep::params::{ArgumentLayout, ParameterSet},
};
use itertools::Itertools;
use std::{fmt, path::PathBuf, process::Command};

/// A fully resolved command line of the analysis program
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    /// Translate a parameter set into the analysis program's options.
    ///
    /// Capital cost and availability are always passed, the wind ceiling is forwarded as both
    /// onshore and offshore limit and every set toggle adds its flag. Values are not validated.
    pub fn analysis(worker: &WorkerConfig, layout: ArgumentLayout, parameters: &ParameterSet) -> Self {
        let mut args = vec![
            worker.script.to_string_lossy().into_owned(),
            String::from("--nuclear-capital-cost"),
            parameters.capital_cost.to_string(),
            String::from("--nuclear-availability"),
            parameters.availability.to_string(),
        ];

        if let (true, Some(wind_ceiling)) = (layout.has_wind_ceiling(), &parameters.wind_ceiling) {
            args.extend([
                String::from("--max-onshore-wind-norway"),
                wind_ceiling.to_string(),
                String::from("--max-offshore-wind-grounded-norway"),
                wind_ceiling.to_string(),
            ]);
        }

        args.extend(
            parameters
                .toggles
                .iter()
                .filter(|toggle| layout.supports(**toggle))
                .map(|toggle| toggle.flag().to_owned()),
        );

        Self {
            program: worker.python.clone(),
            args,
        }
    }

    /// wrap the invocation so it runs inside the prepared environment
    pub fn launched_by(self, launcher: &Launcher) -> Self {
        match launcher {
            Launcher::Direct => self,
            Launcher::Managed { manager, name } => {
                let mut args = vec![
                    String::from("run"),
                    String::from("-n"),
                    name.clone(),
                    String::from("--no-capture-output"),
                    self.program.to_string_lossy().into_owned(),
                ];
                args.extend(self.args);

                Self {
                    program: manager.clone(),
                    args,
                }
            }
        }
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);

        command
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.program.to_string_lossy(),
            self.args.iter().join(" ")
        )
    }
}
