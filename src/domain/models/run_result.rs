//! Result kinds and the keywords wrappers use for them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a run.
///
/// Every kind except `Running` is terminal. `Running` is only ever seen on a
/// live view of an in-flight run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunResult {
    /// Instance solved, satisfiable
    Sat,
    /// Instance solved, unsatisfiable
    Unsat,
    /// Cutoff reached without a decision
    Timeout,
    /// The run failed
    Crashed,
    /// The run reported an unrecoverable problem
    Abort,
    /// Terminated on request
    Killed,
    /// Still in flight
    Running,
}

/// Keywords a wrapper may print, with the kind each maps to.
const KEYWORDS: &[(&str, RunResult)] = &[
    ("SAT", RunResult::Sat),
    ("SATISFIABLE", RunResult::Sat),
    ("UNSAT", RunResult::Unsat),
    ("UNSATISFIABLE", RunResult::Unsat),
    ("TIMEOUT", RunResult::Timeout),
    ("CRASHED", RunResult::Crashed),
    ("ABORT", RunResult::Abort),
    ("KILLED", RunResult::Killed),
    ("RUNNING", RunResult::Running),
];

impl RunResult {
    /// Canonical keyword.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sat => "SAT",
            Self::Unsat => "UNSAT",
            Self::Timeout => "TIMEOUT",
            Self::Crashed => "CRASHED",
            Self::Abort => "ABORT",
            Self::Killed => "KILLED",
            Self::Running => "RUNNING",
        }
    }

    /// Look up a keyword or one of its aliases, ignoring case.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let upper = keyword.trim().to_ascii_uppercase();
        KEYWORDS
            .iter()
            .find(|(name, _)| *name == upper)
            .map(|(_, kind)| *kind)
    }

    /// Whether a wrapper is allowed to report this kind.
    pub const fn is_permitted_by_wrappers(self) -> bool {
        !matches!(self, Self::Killed | Self::Running)
    }

    /// Sorted list of keywords a wrapper may print.
    pub fn wrapper_keywords() -> Vec<&'static str> {
        let mut keywords: Vec<&'static str> = KEYWORDS
            .iter()
            .filter(|(_, kind)| kind.is_permitted_by_wrappers())
            .map(|(name, _)| *name)
            .collect();
        keywords.sort_unstable();
        keywords
    }

    /// `SAT` or `UNSAT`.
    pub const fn is_decided(self) -> bool {
        matches!(self, Self::Sat | Self::Unsat)
    }

    /// Whether this kind ends a run.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
