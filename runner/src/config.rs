use crate::sweep::params::{ArgumentLayout, Literal, Toggle, TOGGLE_FLAGS};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs::File,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file {path:?}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config file is not valid YAML for a sweep")]
    InvalidConfig(#[from] serde_yaml::Error),
    #[error("Executor {0} not supported")]
    UnsupportedExecutor(String),
    #[error("Preflight checks failed, see the log above")]
    PreflightFailed,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(from = "SweepFile")]
pub struct SweepConfig {
    // positional layout shared between driver and worker
    pub layout: ArgumentLayout,
    // value axes, enumerated as a full cartesian product
    pub axes: AxesConfig,
    pub toggles: ToggleSweepConfig,
    // literal parameter sets submitted after the sweep
    pub special_cases: Vec<SpecialCase>,
    pub resources: ResourceConfig,
    // shared directory for the scheduler stream files
    pub output: PathBuf,
    pub executor: ExecutorConfig,
    pub worker: WorkerConfig,
    pub environment: EnvironmentConfig,
}

/// A sweep config as written. Toggles and special cases left out of the file
/// default to what the chosen layout can pass to the worker.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SweepFile {
    #[serde(default = "default_layout")]
    layout: ArgumentLayout,
    #[serde(default)]
    axes: AxesConfig,
    toggles: Option<ToggleSection>,
    special_cases: Option<Vec<SpecialCase>>,
    #[serde(default)]
    resources: ResourceConfig,
    #[serde(default = "default_output")]
    output: PathBuf,
    #[serde(default)]
    executor: ExecutorConfig,
    #[serde(default)]
    worker: WorkerConfig,
    #[serde(default)]
    environment: EnvironmentConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct AxesConfig {
    pub capital_cost: Vec<Literal>,
    pub availability: Vec<Literal>,
    pub wind_ceiling: Option<Vec<Literal>>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToggleMode {
    /// all toggles off
    None,
    /// one toggle on at a time
    Single,
    /// every subset of the toggle set
    Product,
}

#[derive(Serialize, Clone, Debug)]
pub struct ToggleSweepConfig {
    pub mode: ToggleMode,
    pub set: Vec<Toggle>,
    // only used by `single`, the all-off combination is never added implicitly
    pub include_baseline: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ToggleSection {
    #[serde(default = "default_toggle_mode")]
    mode: ToggleMode,
    set: Option<Vec<Toggle>>,
    #[serde(default)]
    include_baseline: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SpecialCase {
    pub capital_cost: Literal,
    pub availability: Literal,
    #[serde(default)]
    pub wind_ceiling: Option<Literal>,
    #[serde(default)]
    pub toggles: Vec<Toggle>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceConfig {
    // h_rt, hh:mm:ss
    pub wall_clock: String,
    // mem_free
    pub memory: String,
    pub slots: u32,
    pub parallel_environment: String,
    // joined into a single `-l h=` expression
    pub hosts: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    // Name of the selected executor, see Executors::load for the selection process
    pub name: String,
    pub submit_command: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    // worker executable submitted with each job, defaults to the running binary
    pub program: Option<PathBuf>,
    pub python: PathBuf,
    pub script: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub enabled: bool,
    pub name: String,
    pub manager: PathBuf,
    pub declarations: PathBuf,
    pub solver_channel: String,
    pub solver_package: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::for_layout(default_layout())
    }
}

impl From<SweepFile> for SweepConfig {
    fn from(file: SweepFile) -> Self {
        let layout = file.layout;

        Self {
            layout,
            axes: file.axes,
            toggles: match file.toggles {
                Some(section) => ToggleSweepConfig {
                    mode: section.mode,
                    set: section
                        .set
                        .unwrap_or_else(|| ToggleSweepConfig::for_layout(layout).set),
                    include_baseline: section.include_baseline,
                },
                None => ToggleSweepConfig::for_layout(layout),
            },
            special_cases: file
                .special_cases
                .unwrap_or_else(|| default_special_cases(layout)),
            resources: file.resources,
            output: file.output,
            executor: file.executor,
            worker: file.worker,
            environment: file.environment,
        }
    }
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self {
            capital_cost: ["3200", "4200", "5300", "6900"].map(Literal::from).to_vec(),
            availability: vec![Literal::from("0.95")],
            wind_ceiling: None,
        }
    }
}

impl ToggleSweepConfig {
    /// one toggle at a time over every toggle the layout has a slot for
    pub fn for_layout(layout: ArgumentLayout) -> Self {
        Self {
            mode: default_toggle_mode(),
            set: TOGGLE_FLAGS
                .iter()
                .map(|(toggle, _)| *toggle)
                .filter(|toggle| layout.supports(*toggle))
                .collect(),
            include_baseline: false,
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            wall_clock: String::from("12:00:00"),
            memory: String::from("150G"),
            slots: 8,
            parallel_environment: String::from("smp"),
            hosts: vec![String::from("compute-6-*"), String::from("compute-7-*")],
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: String::from("grid-engine"),
            submit_command: PathBuf::from("qsub"),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: None,
            python: PathBuf::from("python"),
            script: PathBuf::from("scripts/norway_analysis.py"),
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: String::from("empire_env"),
            manager: PathBuf::from("conda"),
            declarations: PathBuf::from("environment.yml"),
            solver_channel: String::from("gurobi"),
            solver_package: String::from("gurobi"),
        }
    }
}

fn default_layout() -> ArgumentLayout {
    ArgumentLayout::Extended
}

fn default_toggle_mode() -> ToggleMode {
    ToggleMode::Single
}

fn default_output() -> PathBuf {
    PathBuf::from("hpc_output")
}

/// The combined cases of the toggle sweep. They carry no wind ceiling, so the
/// wind-ceiling layout has none.
fn default_special_cases(layout: ArgumentLayout) -> Vec<SpecialCase> {
    if layout.has_wind_ceiling() {
        return Vec::new();
    }

    let case = |capital_cost: &str, toggles: &[Toggle]| SpecialCase {
        capital_cost: Literal::from(capital_cost),
        availability: Literal::from("0.95"),
        wind_ceiling: None,
        toggles: toggles.to_vec(),
    };

    vec![
        case("4200", &[Toggle::Protective, Toggle::Baseload]),
        case("4200", &[Toggle::NoWind, Toggle::Protective]),
        case("5300", &[Toggle::Protective, Toggle::Baseload]),
        case("5300", &[Toggle::NoWind, Toggle::Baseload]),
    ]
}

impl SweepConfig {
    /// the built-in sweep settings for `layout`
    pub fn for_layout(layout: ArgumentLayout) -> Self {
        Self {
            layout,
            axes: AxesConfig::default(),
            toggles: ToggleSweepConfig::for_layout(layout),
            special_cases: default_special_cases(layout),
            resources: ResourceConfig::default(),
            output: default_output(),
            executor: ExecutorConfig::default(),
            worker: WorkerConfig::default(),
            environment: EnvironmentConfig::default(),
        }
    }

    /// load a config file, without a path the built-in sweep is used
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigErrors> {
        match path {
            Some(path) => {
                let file = File::open(path).map_err(|source| ConfigErrors::ReadFailed {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config = serde_yaml::from_reader(file)?;
                info!(path = ?path, "Loaded sweep config");

                Ok(config)
            }
            None => {
                info!("No config given, using the built-in sweep");

                Ok(Self::default())
            }
        }
    }

    /// Run all checks that don't require enumerating the sweep.
    /// Returns true if any error was found, all errors are logged.
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;
        let layout = self.layout;

        let mut axes = vec![
            ("capital_cost", &self.axes.capital_cost),
            ("availability", &self.axes.availability),
        ];
        if let Some(ref wind_ceiling) = self.axes.wind_ceiling {
            axes.push(("wind_ceiling", wind_ceiling));
        }

        for (name, values) in axes {
            if values.is_empty() {
                error!("axes.{name} is empty, the sweep would not submit anything");
                contains_error = true;
            }

            for value in values.iter().filter(|value| !value.is_valid()) {
                error!("axes.{name} value '{value}' may only contain ASCII letters, digits, '.', '+' and '-'");
                contains_error = true;
            }
        }

        if layout.has_wind_ceiling() != self.axes.wind_ceiling.is_some() {
            error!(
                "axes.wind_ceiling must be given if and only if the layout is wind-ceiling (layout: {layout})"
            );
            contains_error = true;
        }

        for toggle in self.toggles.set.iter().filter(|toggle| !layout.supports(**toggle)) {
            error!("toggles.set contains {toggle} which layout {layout} can't pass to the worker");
            contains_error = true;
        }

        for toggle in self.toggles.set.iter().duplicates() {
            error!("toggles.set contains {toggle} more than once");
            contains_error = true;
        }

        match self.toggles.mode {
            ToggleMode::Single if self.toggles.set.is_empty() && !self.toggles.include_baseline => {
                error!("toggles.mode is single but toggles.set is empty, use mode none for a sweep without toggles");
                contains_error = true;
            }
            ToggleMode::None | ToggleMode::Product if self.toggles.include_baseline => {
                warn!("toggles.include_baseline only applies to mode single and is ignored");
            }
            ToggleMode::None if !self.toggles.set.is_empty() => {
                warn!("toggles.set is ignored for mode none");
            }
            _ => {}
        }

        for (index, case) in self.special_cases.iter().enumerate() {
            let literals = [Some(&case.capital_cost), Some(&case.availability)]
                .into_iter()
                .chain([case.wind_ceiling.as_ref()])
                .flatten();

            for value in literals.filter(|value| !value.is_valid()) {
                error!("special_cases[{index}] value '{value}' may only contain ASCII letters, digits, '.', '+' and '-'");
                contains_error = true;
            }

            if layout.has_wind_ceiling() != case.wind_ceiling.is_some() {
                error!("special_cases[{index}].wind_ceiling must be given if and only if the layout is wind-ceiling");
                contains_error = true;
            }

            let toggles: BTreeSet<_> = case.toggles.iter().collect();
            if toggles.len() != case.toggles.len() {
                warn!("special_cases[{index}].toggles contains duplicates, they are merged");
            }

            for toggle in toggles.into_iter().filter(|toggle| !layout.supports(**toggle)) {
                error!("special_cases[{index}] uses {toggle} which layout {layout} can't pass to the worker");
                contains_error = true;
            }
        }

        if self.resources.wall_clock.is_empty() || self.resources.memory.is_empty() {
            error!("resources.wall_clock and resources.memory must not be empty");
            contains_error = true;
        }

        if self.resources.slots == 0 {
            error!("resources.slots must be at least 1");
            contains_error = true;
        }

        if self.resources.hosts.is_empty() {
            warn!("resources.hosts is empty, jobs may be scheduled on any host");
        }

        if self.environment.enabled && self.environment.name.is_empty() {
            error!("environment.name must not be empty while the environment is enabled");
            contains_error = true;
        }

        contains_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn built_in_sweep_passes_preflight() {
        assert!(!SweepConfig::default().preflight_checks());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "layout: wind-ceiling
axes:
  capital_cost: [4200]
  availability: ['0.9', '0.95']
  wind_ceiling: [0, 20000]
toggles:
  mode: product
  set: [protective, baseload]
special_cases: []
resources:
  slots: 4
"
        )
        .unwrap();

        let config = SweepConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.layout, ArgumentLayout::WindCeiling);
        assert_eq!(config.axes.availability.len(), 2);
        assert_eq!(config.toggles.mode, ToggleMode::Product);
        assert_eq!(config.resources.slots, 4);
        assert_eq!(config.resources.wall_clock, "12:00:00");
        assert_eq!(config.resources.memory, "150G");
        assert_eq!(config.output, PathBuf::from("hpc_output"));
        assert!(!config.preflight_checks());
    }

    fn load_str(yaml: &str) -> Result<SweepConfig, ConfigErrors> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        SweepConfig::load(Some(file.path()))
    }

    #[test]
    fn minimal_wind_ceiling_file_passes_preflight() {
        let config = load_str(
            "layout: wind-ceiling
axes: {capital_cost: [4200], wind_ceiling: [0, 20000]}
",
        )
        .unwrap();

        assert_eq!(config.toggles.mode, ToggleMode::Single);
        assert_eq!(config.toggles.set, [Toggle::Protective, Toggle::Baseload]);
        assert!(config.special_cases.is_empty());
        assert_eq!(config.axes.availability, [Literal::from("0.95")]);
        assert!(!config.preflight_checks());
    }

    #[test]
    fn omitted_toggle_set_follows_the_layout() {
        let config = load_str("layout: basic\ntoggles: {include_baseline: true}\n").unwrap();

        assert_eq!(config.toggles.mode, ToggleMode::Single);
        assert!(config.toggles.include_baseline);
        assert_eq!(
            config.toggles.set,
            [Toggle::NoWind, Toggle::Protective, Toggle::Baseload]
        );
        assert_eq!(config.special_cases.len(), 4);
        assert!(!config.preflight_checks());
    }

    #[test]
    fn empty_file_is_the_built_in_sweep() {
        let config = load_str("{}\n").unwrap();
        let built_in = SweepConfig::default();

        assert_eq!(config.layout, built_in.layout);
        assert_eq!(config.toggles.set, built_in.toggles.set);
        assert_eq!(config.special_cases.len(), built_in.special_cases.len());
        assert_eq!(config.output, built_in.output);
    }

    #[test]
    fn unquoted_float_axis_is_rejected() {
        let result = load_str("axes:\n  availability: [0.950]\n");

        assert!(matches!(result, Err(ConfigErrors::InvalidConfig(_))));
    }

    #[test]
    fn unsupported_executor_names_itself() {
        let error = ConfigErrors::UnsupportedExecutor(String::from("slurm"));

        assert_eq!(error.to_string(), "Executor slurm not supported");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        for yaml in [
            "resources:\n  wallclock: '1:00:00'\n",
            "toggles:\n  sets: [ccs]\n",
            "layouts: basic\n",
        ] {
            assert!(
                matches!(load_str(yaml), Err(ConfigErrors::InvalidConfig(_))),
                "{yaml:?} must be rejected"
            );
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let result = SweepConfig::load(Some(Path::new("/nonexistent/sweep.yaml")));

        assert!(matches!(result, Err(ConfigErrors::ReadFailed { .. })));
    }

    #[test]
    fn toggles_must_fit_the_layout() {
        let config = SweepConfig {
            layout: ArgumentLayout::Basic,
            special_cases: Vec::new(),
            ..SweepConfig::default()
        };

        // ccs and germany_austria have no slot in the basic layout
        assert!(config.preflight_checks());
    }

    #[test]
    fn wind_ceiling_axis_follows_the_layout() {
        let mut config = SweepConfig {
            layout: ArgumentLayout::WindCeiling,
            special_cases: Vec::new(),
            ..SweepConfig::default()
        };
        config.toggles.set = vec![Toggle::Protective, Toggle::Baseload];

        assert!(config.preflight_checks());

        config.axes.wind_ceiling = Some(vec![Literal::from("20000")]);
        assert!(!config.preflight_checks());
    }

    #[test]
    fn empty_axes_and_bad_literals_fail() {
        let mut config = SweepConfig::default();
        config.axes.availability.clear();
        assert!(config.preflight_checks());

        let mut config = SweepConfig::default();
        config.axes.capital_cost.push(Literal::from("42_00"));
        assert!(config.preflight_checks());
    }

    #[test]
    fn duplicate_toggles_fail() {
        let mut config = SweepConfig::default();
        config.toggles.set.push(Toggle::Ccs);

        assert!(config.preflight_checks());
    }
}
