//! Decorator remapping outcome values by result kind.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::domain::errors::EvalResult;
use crate::domain::models::{RunOutcome, RunRequest, TransformExpr, TransformRule};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Remaps the runtime and quality of outcomes according to per-kind rules.
///
/// The first rule whose kind matches an outcome is applied; outcomes with no
/// matching rule pass through.
pub struct TransformEvaluator {
    inner: Arc<dyn Evaluator>,
    rules: Vec<TransformRule>,
}

fn resolve(expr: Option<TransformExpr>, reported: f64, cutoff: f64) -> f64 {
    match expr {
        None | Some(TransformExpr::Reported) => reported,
        Some(TransformExpr::Cutoff) => cutoff,
        Some(TransformExpr::Constant(value)) => value,
        Some(TransformExpr::ScaledReported(factor)) => reported * factor,
        Some(TransformExpr::ScaledCutoff(factor)) => cutoff * factor,
    }
}

impl TransformEvaluator {
    /// Apply `rules` in order.
    pub fn new(inner: Arc<dyn Evaluator>, rules: Vec<TransformRule>) -> Self {
        Self { inner, rules }
    }

    fn transform(&self, outcome: RunOutcome) -> EvalResult<RunOutcome> {
        let Some(rule) = self.rules.iter().find(|rule| rule.applies_to == outcome.kind()) else {
            return Ok(outcome);
        };
        let cutoff = outcome.request().cutoff();
        let runtime = resolve(rule.runtime, outcome.runtime(), cutoff);
        let quality = resolve(rule.quality, outcome.quality(), cutoff);
        trace!(run = %outcome.request(), runtime, quality, "Transforming outcome");
        Ok(outcome.with_values(outcome.kind(), runtime, quality)?)
    }
}

#[async_trait]
impl Evaluator for TransformEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let outcomes = self.inner.evaluate(requests, observer).await?;
        outcomes.into_iter().map(|outcome| self.transform(outcome)).collect()
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }
}
