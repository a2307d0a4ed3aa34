//! Implementation of the `tae run` command.

use anyhow::Result;
use serde::Serialize;

use crate::cli::commands::{apply_algorithm_args, evaluate_batch};
use crate::cli::display::style_result;
use crate::cli::output::{output, CommandOutput};
use crate::cli::types::RunArgs;
use crate::domain::models::{Config, ParamConfiguration, ProblemInstance, RunOutcome, RunRequest};

/// Outcome of a `tae run` invocation.
#[derive(Debug, Serialize)]
pub struct RunOutput {
    /// The request as displayed
    pub request: String,
    /// Wrapper-protocol rendering of the outcome
    pub result_line: String,
    /// Full outcome
    pub outcome: RunOutcome,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        format!(
            "{}\n{} {}",
            self.request,
            style_result(self.outcome.kind()),
            self.result_line
        )
    }
}

fn build_request(args: &RunArgs) -> Result<RunRequest> {
    let mut instance = ProblemInstance::new(args.instance.clone());
    if let Some(info) = &args.instance_info {
        instance = instance.with_specific_info(info.clone());
    }
    let config: ParamConfiguration = args.params.iter().cloned().collect();
    Ok(RunRequest::new(instance, args.seed, args.cutoff, config)?)
}

/// Evaluate a single request built from the arguments.
pub async fn execute(args: RunArgs, mut config: Config, json_mode: bool) -> Result<()> {
    apply_algorithm_args(&mut config, &args.algorithm)?;
    let request = build_request(&args)?;

    let mut outcomes = evaluate_batch(config, vec![request.clone()]).await?;
    let outcome = outcomes
        .pop()
        .ok_or_else(|| anyhow::anyhow!("Evaluator returned no outcome for {request}"))?;

    output(
        &RunOutput {
            request: request.to_string(),
            result_line: outcome.result_line(),
            outcome,
        },
        json_mode,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::types::AlgorithmArgs;

    #[test]
    fn test_build_request_from_args() {
        let args = RunArgs {
            algorithm: AlgorithmArgs {
                executable: None,
                exec_dir: None,
            },
            instance: "inst".to_string(),
            instance_info: Some("SAT".to_string()),
            seed: 4,
            cutoff: 2.5,
            params: vec![("x".to_string(), "1".to_string())],
        };
        let request = build_request(&args).unwrap();
        assert_eq!(request.instance().instance_specific_info, "SAT");
        assert_eq!(request.config().get("x"), Some("1"));
        assert_eq!(request.seed(), 4);
    }
}
