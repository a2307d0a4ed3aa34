//! Result kind color mapping for CLI output.
//!
//! Colors are dropped automatically when stdout is not a terminal.

use console::{style, StyledObject};

use crate::domain::models::RunResult;

/// Style a result keyword.
///
/// Decided results are green, timeouts yellow, crashes and aborts red,
/// kills dim.
pub fn style_result(kind: RunResult) -> StyledObject<&'static str> {
    let keyword = kind.as_str();
    match kind {
        RunResult::Sat | RunResult::Unsat => style(keyword).green().bold(),
        RunResult::Timeout => style(keyword).yellow(),
        RunResult::Crashed | RunResult::Abort => style(keyword).red().bold(),
        RunResult::Killed => style(keyword).dim(),
        RunResult::Running => style(keyword).cyan(),
    }
}
