//! Implementation of the `tae batch` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::commands::{apply_algorithm_args, evaluate_batch};
use crate::cli::display::{list_table, render_list, style_result};
use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::types::BatchArgs;
use crate::domain::models::{Config, RunOutcome, RunRequest};

/// Outcomes of a `tae batch` invocation.
#[derive(Debug, Serialize)]
pub struct BatchOutput {
    /// One outcome per request, in file order
    pub outcomes: Vec<RunOutcome>,
}

impl CommandOutput for BatchOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["instance", "seed", "cutoff", "result", "runtime", "quality", "additional"]);
        for outcome in &self.outcomes {
            let request = outcome.request();
            table.add_row(vec![
                truncate(&request.instance().name, 40),
                request.seed().to_string(),
                request.cutoff().to_string(),
                style_result(outcome.kind()).to_string(),
                format!("{:.3}", outcome.runtime()),
                outcome.quality().to_string(),
                truncate(outcome.additional_data(), 30),
            ]);
        }
        render_list("outcome", &table, self.outcomes.len())
    }
}

/// Read a YAML list of run requests.
pub async fn read_requests(path: &Path) -> Result<Vec<RunRequest>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse run requests in {}", path.display()))
}

/// Evaluate every request in the batch file.
pub async fn execute(args: BatchArgs, mut config: Config, json_mode: bool) -> Result<()> {
    apply_algorithm_args(&mut config, &args.algorithm)?;
    let requests = read_requests(&args.file).await?;
    if requests.is_empty() {
        output(&BatchOutput { outcomes: vec![] }, json_mode);
        return Ok(());
    }

    let outcomes = evaluate_batch(config, requests).await?;
    output(&BatchOutput { outcomes }, json_mode);
    Ok(())
}
