//! Backend that answers every request with a fixed result.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{
    KillToken, LiveRun, ParamConfiguration, ProblemInstance, RunOutcome, RunRequest, RunResult,
};
use crate::domain::ports::{notify_observer, Evaluator, ObserverHandle};

/// Backend that answers every request with the same result without running
/// anything. Useful for dry runs of a configuration scenario.
#[derive(Debug)]
pub struct ConstantEvaluator {
    kind: RunResult,
    runtime: f64,
    quality: f64,
    additional_data: String,
    run_count: AtomicU64,
}

impl ConstantEvaluator {
    /// Fails unless `kind` is terminal and the values form a valid outcome.
    pub fn new(kind: RunResult, runtime: f64, quality: f64) -> EvalResult<Self> {
        if !kind.is_terminal() {
            return Err(EvaluatorError::InvalidConfiguration(format!(
                "constant result must be terminal, got {kind}"
            )));
        }
        // reject malformed values up front rather than on every batch
        let sample = RunRequest::new(ProblemInstance::new("sample"), 0, 0.0, ParamConfiguration::new())?;
        RunOutcome::new(sample, kind, runtime, 0.0, quality, 0)?;

        Ok(Self {
            kind,
            runtime,
            quality,
            additional_data: String::new(),
            run_count: AtomicU64::new(0),
        })
    }

    /// Additional data attached to every outcome.
    #[must_use]
    pub fn with_additional_data(mut self, data: impl Into<String>) -> Self {
        self.additional_data = data.into();
        self
    }
}

impl Default for ConstantEvaluator {
    fn default() -> Self {
        Self {
            kind: RunResult::Sat,
            runtime: 1.0,
            quality: 0.0,
            additional_data: String::new(),
            run_count: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Evaluator for ConstantEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let outcomes = requests
            .into_iter()
            .map(|request| -> EvalResult<RunOutcome> {
                let seed = request.seed();
                let outcome = RunOutcome::new(request, self.kind, self.runtime, 0.0, self.quality, seed)?
                    .with_additional_data(self.additional_data.clone())
                    .with_raw_line("Constant Evaluator");
                Ok(outcome)
            })
            .collect::<EvalResult<Vec<_>>>()?;

        self.run_count.fetch_add(outcomes.len() as u64, Ordering::SeqCst);

        if observer.is_some() {
            let snapshots: Vec<LiveRun> = outcomes
                .iter()
                .map(|outcome| LiveRun::completed(outcome.clone(), KillToken::new()))
                .collect();
            notify_observer(observer.as_ref(), &snapshots);
        }

        Ok(outcomes)
    }

    fn run_count(&self) -> u64 {
        self.run_count.load(Ordering::SeqCst)
    }

    fn is_run_final(&self) -> bool {
        true
    }
}
