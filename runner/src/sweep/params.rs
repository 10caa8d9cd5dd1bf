use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("Layout {layout} expects {expected} positional arguments, got {found}")]
    ArgumentCount {
        layout: ArgumentLayout,
        expected: usize,
        found: usize,
    },
    #[error("Layout {0} requires a wind ceiling value")]
    MissingWindCeiling(ArgumentLayout),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Integer(i64),
    Float(f64),
    Text(String),
}

/// A literal axis value, reused in job names and forwarded arguments without reformatting.
/// Strings are kept as written and integers in decimal. Floats have to be quoted in YAML,
/// an unquoted float has already lost its written form (`0.950`, `6900.0`) once it is parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Scalar", into = "String")]
pub struct Literal(String);

impl Literal {
    /// literals end up in scheduler job names, keep them to a safe alphabet without '_'
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-'))
    }
}

impl TryFrom<Scalar> for Literal {
    type Error = String;

    fn try_from(value: Scalar) -> Result<Self, Self::Error> {
        match value {
            Scalar::Integer(value) => Ok(Self(value.to_string())),
            Scalar::Float(value) => Err(format!(
                "unquoted float {value} can't be kept as written, quote it like '{value}'"
            )),
            Scalar::Text(value) => Ok(Self(value)),
        }
    }
}

impl From<Literal> for String {
    fn from(value: Literal) -> Self {
        value.0
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Boolean cases of the analysis. The declaration order is the order flags are emitted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toggle {
    NoWind,
    Protective,
    Baseload,
    Ccs,
    GermanyAustria,
}

/// toggle -> flag passed to the analysis program when the toggle is set
pub const TOGGLE_FLAGS: [(Toggle, &str); 5] = [
    (Toggle::NoWind, "-w"),
    (Toggle::Protective, "-p"),
    (Toggle::Baseload, "-b"),
    (Toggle::Ccs, "-c"),
    (Toggle::GermanyAustria, "-g"),
];

impl Toggle {
    pub fn flag(self) -> &'static str {
        TOGGLE_FLAGS
            .iter()
            .find(|(toggle, _)| *toggle == self)
            .map(|(_, flag)| *flag)
            .unwrap_or_default()
    }

    /// single character used when encoding the toggle into a job name
    pub fn letter(self) -> char {
        self.flag().chars().nth(1).unwrap_or('?')
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoWind => "no_wind",
            Self::Protective => "protective",
            Self::Baseload => "baseload",
            Self::Ccs => "ccs",
            Self::GermanyAustria => "germany_austria",
        };

        f.write_str(name)
    }
}

/// One positional argument slot of the worker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    CapitalCost,
    Availability,
    WindCeiling,
    Toggle(Toggle),
}

/// Positional argument layouts understood by the worker.
/// The driver passes the layout along with every job, so both sides agree on the order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ArgumentLayout {
    /// capital-cost availability no-wind protective baseload
    Basic,
    /// capital-cost availability no-wind protective baseload ccs germany-austria
    Extended,
    /// capital-cost availability wind-ceiling protective baseload
    #[default]
    WindCeiling,
}

impl ArgumentLayout {
    pub fn slots(self) -> &'static [Slot] {
        match self {
            Self::Basic => &[
                Slot::CapitalCost,
                Slot::Availability,
                Slot::Toggle(Toggle::NoWind),
                Slot::Toggle(Toggle::Protective),
                Slot::Toggle(Toggle::Baseload),
            ],
            Self::Extended => &[
                Slot::CapitalCost,
                Slot::Availability,
                Slot::Toggle(Toggle::NoWind),
                Slot::Toggle(Toggle::Protective),
                Slot::Toggle(Toggle::Baseload),
                Slot::Toggle(Toggle::Ccs),
                Slot::Toggle(Toggle::GermanyAustria),
            ],
            Self::WindCeiling => &[
                Slot::CapitalCost,
                Slot::Availability,
                Slot::WindCeiling,
                Slot::Toggle(Toggle::Protective),
                Slot::Toggle(Toggle::Baseload),
            ],
        }
    }

    pub fn supports(self, toggle: Toggle) -> bool {
        self.slots().contains(&Slot::Toggle(toggle))
    }

    pub fn has_wind_ceiling(self) -> bool {
        self.slots().contains(&Slot::WindCeiling)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Extended => "extended",
            Self::WindCeiling => "wind-ceiling",
        }
    }
}

impl fmt::Display for ArgumentLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParameterSet {
    pub capital_cost: Literal,
    pub availability: Literal,
    pub wind_ceiling: Option<Literal>,
    /// toggles that are set, everything else is off
    pub toggles: BTreeSet<Toggle>,
}

impl ParameterSet {
    pub fn is_set(&self, toggle: Toggle) -> bool {
        self.toggles.contains(&toggle)
    }

    /// render into the positional arguments of `layout`
    pub fn render(&self, layout: ArgumentLayout) -> Result<Vec<String>, ParameterError> {
        layout
            .slots()
            .iter()
            .map(|slot| match slot {
                Slot::CapitalCost => Ok(self.capital_cost.to_string()),
                Slot::Availability => Ok(self.availability.to_string()),
                Slot::WindCeiling => self
                    .wind_ceiling
                    .as_ref()
                    .map(Literal::to_string)
                    .ok_or(ParameterError::MissingWindCeiling(layout)),
                Slot::Toggle(toggle) => Ok(self.is_set(*toggle).to_string()),
            })
            .collect()
    }

    /// parse positional arguments of `layout`, a toggle is only set by the exact string "true"
    pub fn parse<S: AsRef<str>>(layout: ArgumentLayout, raw: &[S]) -> Result<Self, ParameterError> {
        let slots = layout.slots();

        if slots.len() != raw.len() {
            return Err(ParameterError::ArgumentCount {
                layout,
                expected: slots.len(),
                found: raw.len(),
            });
        }

        let mut parameters = Self {
            capital_cost: Literal::default(),
            availability: Literal::default(),
            wind_ceiling: None,
            toggles: BTreeSet::new(),
        };

        for (slot, value) in slots.iter().zip(raw.iter().map(AsRef::as_ref)) {
            match slot {
                Slot::CapitalCost => parameters.capital_cost = Literal::from(value),
                Slot::Availability => parameters.availability = Literal::from(value),
                Slot::WindCeiling => parameters.wind_ceiling = Some(Literal::from(value)),
                Slot::Toggle(toggle) => {
                    if value == "true" {
                        parameters.toggles.insert(*toggle);
                    }
                }
            }
        }

        Ok(parameters)
    }
}
