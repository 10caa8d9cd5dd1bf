use crate::config::EnvironmentConfig;
use std::{
    env,
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

/// variable the environment manager sets for the active environment
const ACTIVE_ENVIRONMENT: &str = "CONDA_DEFAULT_ENV";

#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Failed to run the environment manager")]
    Spawn(#[from] std::io::Error),
    #[error("Environment manager failed to {step} ({status})")]
    ManagerFailed {
        step: &'static str,
        status: ExitStatus,
    },
    #[error("Environment declarations {0:?} not found")]
    MissingDeclarations(PathBuf),
}

/// State of the required environment, as found before the analysis runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvironmentCheck {
    AlreadyActive,
    ActivateExisting,
    CreateNew,
}

/// How the analysis program has to be started once the environment is ready
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Launcher {
    /// run the program as is
    Direct,
    /// run through `<manager> run -n <name>`
    Managed { manager: PathBuf, name: String },
}

/// names of the environments listed by `conda env list`.
/// Unnamed environments are listed by their path only, `run -n` can't reach them.
pub fn listed_environments(listing: &str) -> impl Iterator<Item = &str> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .filter(|entry| !Path::new(entry).is_absolute())
}

pub fn classify(required: &str, active: Option<&str>, listing: &str) -> EnvironmentCheck {
    if active == Some(required) {
        EnvironmentCheck::AlreadyActive
    } else if listed_environments(listing).any(|name| name == required) {
        EnvironmentCheck::ActivateExisting
    } else {
        EnvironmentCheck::CreateNew
    }
}

#[derive(Debug)]
pub struct EnvironmentManager<'a> {
    config: &'a EnvironmentConfig,
}

impl<'a> EnvironmentManager<'a> {
    pub fn new(config: &'a EnvironmentConfig) -> Self {
        Self { config }
    }

    /// figure out what has to happen before the analysis can run
    #[instrument(skip(self), level = "debug")]
    pub fn probe(&self) -> Result<EnvironmentCheck, EnvironmentError> {
        let active = env::var(ACTIVE_ENVIRONMENT).ok();

        if active.as_deref() == Some(self.config.name.as_str()) {
            return Ok(EnvironmentCheck::AlreadyActive);
        }

        let output = Command::new(&self.config.manager)
            .args(["env", "list"])
            .stderr(Stdio::inherit())
            .output()?;

        if !output.status.success() {
            return Err(EnvironmentError::ManagerFailed {
                step: "list environments",
                status: output.status,
            });
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        debug!(listing = %listing, "Environment listing");

        Ok(classify(&self.config.name, active.as_deref(), &listing))
    }

    /// act on a probe result, creating the environment and its solver if necessary
    #[instrument(skip(self), level = "info")]
    pub fn setup(&self, check: EnvironmentCheck) -> Result<Launcher, EnvironmentError> {
        let name = self.config.name.as_str();

        match check {
            EnvironmentCheck::AlreadyActive => {
                info!("Environment {name} is already active");

                return Ok(Launcher::Direct);
            }
            EnvironmentCheck::ActivateExisting => {
                info!("Using existing environment {name}");
            }
            EnvironmentCheck::CreateNew => {
                if !self.config.declarations.is_file() {
                    error!(
                        "Environment {name} doesn't exist and {} can't be found to create it",
                        self.config.declarations.to_string_lossy()
                    );

                    return Err(EnvironmentError::MissingDeclarations(
                        self.config.declarations.clone(),
                    ));
                }

                info!(
                    "Creating environment {name} from {}",
                    self.config.declarations.to_string_lossy()
                );
                self.run(
                    "create the environment",
                    [
                        OsStr::new("env"),
                        OsStr::new("create"),
                        OsStr::new("-n"),
                        OsStr::new(name),
                        OsStr::new("-f"),
                        self.config.declarations.as_os_str(),
                    ],
                )?;

                info!(
                    "Installing {} from channel {} into {name}",
                    self.config.solver_package, self.config.solver_channel
                );
                self.run(
                    "install the solver",
                    [
                        "install",
                        "-y",
                        "-n",
                        name,
                        "-c",
                        self.config.solver_channel.as_str(),
                        self.config.solver_package.as_str(),
                    ]
                    .map(OsStr::new),
                )?;
            }
        }

        Ok(Launcher::Managed {
            manager: self.config.manager.clone(),
            name: self.config.name.clone(),
        })
    }

    fn run<I, S>(&self, step: &'static str, args: I) -> Result<(), EnvironmentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let status = Command::new(&self.config.manager).args(args).status()?;

        if status.success() {
            Ok(())
        } else {
            error!(status = ?status, "Environment manager failed to {step}");

            Err(EnvironmentError::ManagerFailed { step, status })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const LISTING: &str = "# conda environments:
#
base                  *  /opt/conda
empire_env               /opt/conda/envs/empire_env
                         /scratch/envs/unnamed
";

    #[test]
    fn listing_skips_comments_and_unnamed_environments() {
        let names: Vec<_> = listed_environments(LISTING).collect();

        assert_eq!(names, ["base", "empire_env"]);
    }

    #[test]
    fn unnamed_environment_does_not_satisfy_a_name() {
        // only the path of /scratch/envs/unnamed is known, `run -n unnamed` would fail
        assert_eq!(
            classify("unnamed", None, LISTING),
            EnvironmentCheck::CreateNew
        );
    }

    #[test]
    fn classify_prefers_the_active_environment() {
        assert_eq!(
            classify("empire_env", Some("empire_env"), ""),
            EnvironmentCheck::AlreadyActive
        );
        assert_eq!(
            classify("empire_env", Some("base"), LISTING),
            EnvironmentCheck::ActivateExisting
        );
        assert_eq!(
            classify("empire_env", None, LISTING),
            EnvironmentCheck::ActivateExisting
        );
        assert_eq!(
            classify("other_env", Some("base"), LISTING),
            EnvironmentCheck::CreateNew
        );
    }

    #[test]
    fn existing_environment_runs_through_the_manager() {
        let config = EnvironmentConfig::default();
        let launcher = EnvironmentManager::new(&config)
            .setup(EnvironmentCheck::ActivateExisting)
            .unwrap();

        assert_eq!(
            launcher,
            Launcher::Managed {
                manager: PathBuf::from("conda"),
                name: String::from("empire_env")
            }
        );
    }

    #[test]
    fn creation_needs_declarations() {
        let scratch = tempdir().unwrap();
        let config = EnvironmentConfig {
            declarations: scratch.path().join("environment.yml"),
            ..EnvironmentConfig::default()
        };

        let result = EnvironmentManager::new(&config).setup(EnvironmentCheck::CreateNew);

        assert!(matches!(result, Err(EnvironmentError::MissingDeclarations(_))));
    }

    #[test]
    fn failing_manager_stops_setup() {
        let scratch = tempdir().unwrap();
        let declarations = scratch.path().join("environment.yml");
        std::fs::write(&declarations, "name: empire_env\n").unwrap();
        let config = EnvironmentConfig {
            declarations,
            manager: PathBuf::from("false"),
            ..EnvironmentConfig::default()
        };

        let result = EnvironmentManager::new(&config).setup(EnvironmentCheck::CreateNew);

        assert!(matches!(
            result,
            Err(EnvironmentError::ManagerFailed {
                step: "create the environment",
                ..
            })
        ));
    }

    #[test]
    fn successful_creation_installs_the_solver() {
        let scratch = tempdir().unwrap();
        let declarations = scratch.path().join("environment.yml");
        std::fs::write(&declarations, "name: empire_env\n").unwrap();
        let config = EnvironmentConfig {
            declarations,
            manager: PathBuf::from("true"),
            ..EnvironmentConfig::default()
        };

        let launcher = EnvironmentManager::new(&config)
            .setup(EnvironmentCheck::CreateNew)
            .unwrap();

        assert!(matches!(launcher, Launcher::Managed { .. }));
    }
}
