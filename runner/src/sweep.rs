pub mod job;
pub mod params;


use crate::config::{ConfigErrors, SpecialCase, SweepConfig, ToggleMode, ToggleSweepConfig};
use itertools::{iproduct, Itertools};
use job::{JobDescriptor, WorkerCommand};
use params::{Literal, ParameterSet, Toggle};
use std::collections::BTreeSet;
use tracing::{debug, error, info, instrument};

impl SpecialCase {
    pub fn to_parameters(&self) -> ParameterSet {
        ParameterSet {
            capital_cost: self.capital_cost.clone(),
            availability: self.availability.clone(),
            wind_ceiling: self.wind_ceiling.clone(),
            toggles: self.toggles.iter().copied().collect(),
        }
    }
}

/// toggle combinations of a sweep, in emission order
pub fn toggle_combinations(config: &ToggleSweepConfig) -> Vec<BTreeSet<Toggle>> {
    match config.mode {
        ToggleMode::None => vec![BTreeSet::new()],
        ToggleMode::Single => {
            let baseline = config.include_baseline.then(BTreeSet::new);

            baseline
                .into_iter()
                .chain(
                    config
                        .set
                        .iter()
                        .unique()
                        .map(|toggle| BTreeSet::from([*toggle])),
                )
                .collect()
        }
        ToggleMode::Product => config
            .set
            .iter()
            .unique()
            .copied()
            .powerset()
            .map(BTreeSet::from_iter)
            .collect(),
    }
}

/// Enumerate all parameter sets of a sweep.
///
/// Axes are iterated outer to inner in declaration order (capital cost, availability, wind
/// ceiling, toggles), special cases follow in the order they were declared.
pub fn enumerate(config: &SweepConfig) -> Vec<ParameterSet> {
    let wind_ceilings: Vec<Option<Literal>> = match config.axes.wind_ceiling {
        Some(ref values) => values.iter().cloned().map(Some).collect(),
        None => vec![None],
    };
    let toggles = toggle_combinations(&config.toggles);

    iproduct!(
        config.axes.capital_cost.iter(),
        config.axes.availability.iter(),
        wind_ceilings.iter(),
        toggles.iter()
    )
    .map(
        |(capital_cost, availability, wind_ceiling, toggles)| ParameterSet {
            capital_cost: capital_cost.clone(),
            availability: availability.clone(),
            wind_ceiling: wind_ceiling.clone(),
            toggles: toggles.clone(),
        },
    )
    .chain(config.special_cases.iter().map(SpecialCase::to_parameters))
    .collect()
}

/// Build the job descriptors of a sweep and make sure no two jobs share a name.
#[instrument(skip_all, level = "info")]
pub fn plan(config: &SweepConfig, worker: &WorkerCommand) -> Result<Vec<JobDescriptor>, ConfigErrors> {
    let mut contains_error = false;
    let mut jobs = Vec::new();

    for parameters in enumerate(config) {
        match JobDescriptor::new(parameters, config, worker) {
            Ok(job) => {
                debug!(name = %job.name, "Planned job");
                jobs.push(job);
            }
            Err(error) => {
                error!(error = ?error, "Failed to build job: {error}");
                contains_error = true;
            }
        }
    }

    // a special case repeating a swept combination would also share its stream files
    for name in jobs.iter().map(|job| job.name.as_str()).duplicates() {
        error!("Job {name} is generated more than once, check special_cases against the sweep");
        contains_error = true;
    }

    if contains_error {
        Err(ConfigErrors::PreflightFailed)
    } else {
        info!("Planned {} jobs", jobs.len());

        Ok(jobs)
    }
}
