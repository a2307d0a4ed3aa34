//! Backend replaying a scripted queue of responses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{KillToken, LiveRun, RunOutcome, RunRequest, RunResult};
use crate::domain::ports::{notify_observer, Evaluator, ObserverHandle};

/// One scripted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreloadedResponse {
    /// Result kind of the outcome
    pub kind: RunResult,
    /// Reported runtime in seconds
    pub runtime: f64,
    /// Reported quality
    #[serde(default)]
    pub quality: f64,
    /// Free-form trailing data
    #[serde(default)]
    pub additional_data: String,
}

impl PreloadedResponse {
    /// A response with zero quality and no additional data.
    pub fn new(kind: RunResult, runtime: f64) -> Self {
        Self {
            kind,
            runtime,
            quality: 0.0,
            additional_data: String::new(),
        }
    }

    /// Report `quality` instead of zero.
    #[must_use]
    pub const fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    /// Report trailing data.
    #[must_use]
    pub fn with_additional_data(mut self, data: impl Into<String>) -> Self {
        self.additional_data = data.into();
        self
    }
}

/// Backend that answers requests from a fixed queue of responses, in order.
///
/// Exhausting the queue is an `ABORT`.
#[derive(Debug, Default)]
pub struct PreloadedEvaluator {
    responses: Mutex<VecDeque<PreloadedResponse>>,
    run_count: AtomicU64,
}

impl PreloadedEvaluator {
    /// Queue `responses` in the order they will be handed out.
    pub fn new(responses: impl IntoIterator<Item = PreloadedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            run_count: AtomicU64::new(0),
        }
    }

    /// Append more responses to the end of the queue.
    pub fn push(&self, response: PreloadedResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    /// Responses not yet handed out.
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Evaluator for PreloadedEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let answers: Vec<PreloadedResponse> = {
            let mut queue = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
            if queue.len() < requests.len() {
                return Err(EvaluatorError::Abort(format!(
                    "Preloaded responses exhausted: {} requested, {} remaining",
                    requests.len(),
                    queue.len()
                )));
            }
            queue.drain(..requests.len()).collect()
        };

        let mut outcomes = Vec::with_capacity(requests.len());
        for (request, answer) in requests.into_iter().zip(answers) {
            let seed = request.seed();
            let outcome = RunOutcome::new(request, answer.kind, answer.runtime, 0.0, answer.quality, seed)?
                .with_additional_data(answer.additional_data)
                .with_raw_line("Preloaded Response");
            outcomes.push(outcome);
        }

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ParamConfiguration, ProblemInstance};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn request(seed: i64) -> RunRequest {
        RunRequest::new(ProblemInstance::new("i1"), seed, 10.0, ParamConfiguration::new()).unwrap()
    }

    #[tokio::test]
    async fn test_answers_in_queue_order() {
        let evaluator = PreloadedEvaluator::new([
            PreloadedResponse::new(RunResult::Sat, 1.0),
            PreloadedResponse::new(RunResult::Crashed, 2.0).with_additional_data("segfault"),
            PreloadedResponse::new(RunResult::Timeout, 10.0),
        ]);

        let outcomes = evaluator
            .evaluate(vec![request(1), request(2)], None)
            .await
            .unwrap();
        assert_eq!(outcomes[0].kind(), RunResult::Sat);
        assert_eq!(outcomes[1].kind(), RunResult::Crashed);
        assert_eq!(outcomes[1].additional_data(), "segfault");
        assert_eq!(evaluator.remaining(), 1);
        assert_eq!(evaluator.run_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_queue_aborts_without_consuming() {
        let evaluator = PreloadedEvaluator::new([PreloadedResponse::new(RunResult::Sat, 1.0)]);
        let result = evaluator.evaluate(vec![request(1), request(2)], None).await;
        assert!(matches!(result, Err(EvaluatorError::Abort(_))));
        assert_eq!(evaluator.remaining(), 1);
    }

    #[tokio::test]
    async fn test_observer_sees_completed_runs() {
        let evaluator = PreloadedEvaluator::new([PreloadedResponse::new(RunResult::Unsat, 0.5)]);
        let seen = Arc::new(AtomicUsize::new(0));
        let observer: ObserverHandle = {
            let seen = Arc::clone(&seen);
            Arc::new(move |runs: &[LiveRun]| {
                assert!(runs.iter().all(|run| !run.is_running()));
                seen.fetch_add(runs.len(), Ordering::SeqCst);
            })
        };

        evaluator.evaluate(vec![request(3)], Some(observer)).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
