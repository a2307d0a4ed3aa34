//! Decorator checking decided outcomes against instance metadata.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::domain::errors::EvalResult;
use crate::domain::models::{RunOutcome, RunRequest, RunResult};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// What instance specific information says about an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Sat,
    Unsat,
    Unknown,
}

fn expected(info: &str) -> Option<Expected> {
    match info.trim() {
        "SAT" | "SATISFIABLE" => Some(Expected::Sat),
        "UNSAT" | "UNSATISFIABLE" => Some(Expected::Unsat),
        "UNKNOWN" => Some(Expected::Unknown),
        _ => None,
    }
}

/// Compares decided outcomes against the answer recorded in the instance
/// specific information. Mismatches are logged; outcomes are never changed.
///
/// In auto mode a batch is only checked when every request in it carries
/// recognizable SAT metadata.
pub struct VerifySatEvaluator {
    inner: Arc<dyn Evaluator>,
    auto: bool,
    mismatches: AtomicU64,
}

impl VerifySatEvaluator {
    /// Check every batch.
    pub fn new(inner: Arc<dyn Evaluator>) -> Self {
        Self {
            inner,
            auto: false,
            mismatches: AtomicU64::new(0),
        }
    }

    /// Check only batches whose instances all carry SAT metadata.
    pub fn auto(inner: Arc<dyn Evaluator>) -> Self {
        Self {
            auto: true,
            ..Self::new(inner)
        }
    }

    fn applies_to(requests: &[RunRequest]) -> bool {
        !requests.is_empty()
            && requests
                .iter()
                .all(|request| expected(&request.instance().instance_specific_info).is_some())
    }

    fn check(&self, outcome: &RunOutcome) {
        let info = &outcome.request().instance().instance_specific_info;
        let saw = outcome.kind();
        match (saw, expected(info)) {
            (RunResult::Sat, Some(Expected::Unsat)) | (RunResult::Unsat, Some(Expected::Sat)) => {
                self.mismatches.fetch_add(1, Ordering::Relaxed);
                error!(
                    saw = %saw,
                    expected = %info,
                    run = %outcome,
                    "Mismatch between instance specific information and target algorithm result"
                );
            }
            (RunResult::Sat | RunResult::Unsat, Some(Expected::Unknown)) => {
                warn!(
                    saw = %saw,
                    expected = %info,
                    run = %outcome,
                    "Target algorithm decided an instance recorded as UNKNOWN"
                );
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Evaluator for VerifySatEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let checked = !self.auto || Self::applies_to(&requests);
        let outcomes = self.inner.evaluate(requests, observer).await?;
        if checked {
            outcomes.iter().for_each(|outcome| self.check(outcome));
        }
        Ok(outcomes)
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }
}
