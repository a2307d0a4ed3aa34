//! Run requests: the immutable description of one evaluation.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::domain::errors::EvaluatorError;

/// A problem instance the target algorithm is run on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProblemInstance {
    /// Instance name, passed to the wrapper as the first argument
    pub name: String,

    /// Free-form instance metadata, e.g. the expected `SAT`/`UNSAT` answer
    #[serde(default = "default_instance_specific_info")]
    pub instance_specific_info: String,
}

fn default_instance_specific_info() -> String {
    "0".to_string()
}

impl ProblemInstance {
    /// Create an instance with no specific information.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_specific_info: default_instance_specific_info(),
        }
    }

    /// Attach instance specific information.
    #[must_use]
    pub fn with_specific_info(mut self, info: impl Into<String>) -> Self {
        self.instance_specific_info = info.into();
        self
    }
}

/// A parameter configuration of the target algorithm.
///
/// Parameters listed as inactive are conditionally disabled and are never
/// passed to the wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamConfiguration {
    #[serde(default)]
    values: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    inactive: BTreeSet<String>,
}

impl ParamConfiguration {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Mark a parameter as inactive.
    #[must_use]
    pub fn with_inactive(mut self, name: impl Into<String>) -> Self {
        self.inactive.insert(name.into());
        self
    }

    /// Value of a parameter, active or not.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Active parameters in name order.
    pub fn active_parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .filter(|(name, _)| !self.inactive.contains(*name))
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Short stable identifier used in log lines.
    pub fn friendly_id(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        format!("0x{:08X}", hasher.finish() & 0xFFFF_FFFF)
    }
}

impl FromIterator<(String, String)> for ParamConfiguration {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
            inactive: BTreeSet::new(),
        }
    }
}

/// One evaluation to perform.
///
/// Equality and hashing are by value and are used as the identity key for
/// duplicate detection and for matching results back to requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RunRequestFields")]
pub struct RunRequest {
    instance: ProblemInstance,
    seed: i64,
    cutoff: f64,
    config: ParamConfiguration,
    censored: bool,
}

#[derive(Deserialize)]
struct RunRequestFields {
    instance: ProblemInstance,
    seed: i64,
    cutoff: f64,
    #[serde(default)]
    config: ParamConfiguration,
    #[serde(default)]
    censored: bool,
}

impl TryFrom<RunRequestFields> for RunRequest {
    type Error = EvaluatorError;

    fn try_from(fields: RunRequestFields) -> Result<Self, Self::Error> {
        Self::new(fields.instance, fields.seed, fields.cutoff, fields.config)
            .map(|request| request.with_censored(fields.censored))
    }
}

impl RunRequest {
    /// Create a request. The cutoff must be finite and non-negative.
    pub fn new(
        instance: ProblemInstance,
        seed: i64,
        cutoff: f64,
        config: ParamConfiguration,
    ) -> Result<Self, EvaluatorError> {
        if !cutoff.is_finite() || cutoff < 0.0 {
            return Err(EvaluatorError::InvalidConfiguration(format!(
                "cutoff must be finite and non-negative, got {cutoff}"
            )));
        }

        Ok(Self {
            instance,
            seed,
            // normalizes -0.0 so equal cutoffs hash equally
            cutoff: cutoff + 0.0,
            config,
            censored: false,
        })
    }

    /// Mark the cutoff as below the true budget.
    #[must_use]
    pub const fn with_censored(mut self, censored: bool) -> Self {
        self.censored = censored;
        self
    }

    /// Instance to run on.
    pub const fn instance(&self) -> &ProblemInstance {
        &self.instance
    }

    /// Seed passed to the wrapper.
    pub const fn seed(&self) -> i64 {
        self.seed
    }

    /// Cutoff time in seconds (may be 0)
    pub const fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Parameter configuration.
    pub const fn config(&self) -> &ParamConfiguration {
        &self.config
    }

    /// Whether the cutoff is below the true maximum budget
    pub const fn censored(&self) -> bool {
        self.censored
    }
}

impl PartialEq for RunRequest {
    fn eq(&self, other: &Self) -> bool {
        self.instance == other.instance
            && self.seed == other.seed
            && self.cutoff.to_bits() == other.cutoff.to_bits()
            && self.config == other.config
            && self.censored == other.censored
    }
}

impl Eq for RunRequest {}

impl Hash for RunRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instance.hash(state);
        self.seed.hash(state);
        self.cutoff.to_bits().hash(state);
        self.config.hash(state);
        self.censored.hash(state);
    }
}

impl fmt::Display for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Instance:{}, Seed:{}, Config:{}, Kappa:{}>",
            self.instance.name,
            self.seed,
            self.config.friendly_id(),
            self.cutoff
        )
    }
}
