//! Evaluator that runs the target algorithm as a local process per request.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::adapters::evaluators::BatchRunner;
use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{
    CommandLineOptions, ExecutionConfig, KillCommands, KillToken, RunOutcome, RunRequest, RunResult,
};
use crate::domain::ports::{evaluate_via_submit, EvaluationCallback, Evaluator, ObserverHandle};
use crate::infrastructure::process::{split_command_line, Launcher, SlotPool, MIN_OBSERVER_FREQUENCY_MS};
use crate::infrastructure::sync::InFlightCounter;

const SHUTDOWN_WARNING_INTERVAL: Duration = Duration::from_secs(10);

/// Command line backend.
///
/// Asynchronous submission is the primitive here; synchronous evaluation
/// waits on a submission. Every run of the backend shares one slot pool of
/// `cores` slots, and at most `cores` batches execute at once.
pub struct CommandLineEvaluator {
    core: Arc<CommandLineCore>,
}

struct CommandLineCore {
    runner: BatchRunner,
    batch_permits: Arc<Semaphore>,
    slots: SlotPool,
    interrupt: KillToken,
    batches: InFlightCounter,
    runs: InFlightCounter,
    shutting_down: AtomicBool,
    run_count: AtomicU64,
}

impl CommandLineEvaluator {
    /// Validate the options and prepare a backend with `cores` slots.
    pub fn new(
        execution: ExecutionConfig,
        options: CommandLineOptions,
        kill_commands: KillCommands,
    ) -> EvalResult<Self> {
        if !execution.exec_dir.is_dir() {
            return Err(EvaluatorError::InvalidExecDir(execution.exec_dir));
        }
        if split_command_line(&execution.executable).is_empty() {
            return Err(EvaluatorError::InvalidConfiguration(
                "executable must not be empty".to_string(),
            ));
        }
        if options.cores == 0 {
            return Err(EvaluatorError::InvalidConfiguration(
                "cores must be at least 1".to_string(),
            ));
        }
        if options.observer_frequency_ms < MIN_OBSERVER_FREQUENCY_MS {
            return Err(EvaluatorError::InvalidConfiguration(format!(
                "observer frequency must be at least {MIN_OBSERVER_FREQUENCY_MS}ms, got {}",
                options.observer_frequency_ms
            )));
        }

        let cores = options.cores;
        let concurrency = if options.concurrent_execution { cores } else { 1 };
        let slots = SlotPool::new(cores);
        let interrupt = KillToken::new();
        let launcher = Launcher::new(execution, options, kill_commands, slots.clone(), interrupt.clone());

        Ok(Self {
            core: Arc::new(CommandLineCore {
                runner: BatchRunner::new(Arc::new(launcher), concurrency),
                batch_permits: Arc::new(Semaphore::new(cores)),
                slots,
                interrupt,
                batches: InFlightCounter::new(),
                runs: InFlightCounter::new(),
                shutting_down: AtomicBool::new(false),
                run_count: AtomicU64::new(0),
            }),
        })
    }
}

impl CommandLineCore {
    fn dispatch(
        self: Arc<Self>,
        requests: Vec<RunRequest>,
        callback: EvaluationCallback,
        observer: Option<ObserverHandle>,
    ) {
        if self.shutting_down.load(Ordering::SeqCst) {
            callback.on_failure(EvaluatorError::Shutdown);
            return;
        }
        if requests.is_empty() {
            callback.on_success(vec![]);
            return;
        }

        let batch_guard = self.batches.enter();
        let runs_guard = self.runs.enter_many(requests.len());
        tokio::spawn(async move {
            let _guards = (batch_guard, runs_guard);
            let Ok(_permit) = Arc::clone(&self.batch_permits).acquire_owned().await else {
                callback.on_failure(EvaluatorError::Shutdown);
                return;
            };

            let count = requests.len() as u64;
            let outcomes = self.runner.run(requests, observer).await;
            self.run_count.fetch_add(count, Ordering::SeqCst);

            match outcomes.iter().find(|outcome| outcome.kind() == RunResult::Abort) {
                Some(aborted) => callback.on_failure(EvaluatorError::Abort(format!(
                    "{} reported ABORT: {}",
                    aborted.request(),
                    aborted.raw_line()
                ))),
                None => callback.on_success(outcomes),
            }
        });
    }
}

#[async_trait]
impl Evaluator for CommandLineEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let core = Arc::clone(&self.core);
        evaluate_via_submit(move |callback| core.dispatch(requests, callback, observer)).await
    }

    fn submit(
        self: Arc<Self>,
        requests: Vec<RunRequest>,
        callback: EvaluationCallback,
        observer: Option<ObserverHandle>,
    ) {
        Arc::clone(&self.core).dispatch(requests, callback, observer);
    }

    async fn wait_for_outstanding_evaluations(&self) -> EvalResult<()> {
        self.core.batches.wait_for_zero().await;
        Ok(())
    }

    fn outstanding_batches(&self) -> EvalResult<usize> {
        Ok(self.core.batches.current())
    }

    fn outstanding_runs(&self) -> EvalResult<usize> {
        Ok(self.core.runs.current())
    }

    fn run_count(&self) -> u64 {
        self.core.run_count.load(Ordering::SeqCst)
    }

    fn are_runs_observable(&self) -> bool {
        true
    }

    async fn shutdown(&self) {
        if self.core.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("Command line evaluator already shut down");
            return;
        }

        info!(
            outstanding = self.core.batches.current(),
            "Shutting down command line evaluator"
        );
        self.core.interrupt.kill();
        self.core.slots.close();
        self.core.batch_permits.close();

        while tokio::time::timeout(SHUTDOWN_WARNING_INTERVAL, self.core.batches.wait_for_zero())
            .await
            .is_err()
        {
            warn!(
                outstanding = self.core.batches.current(),
                "Waiting for target algorithm runs to terminate"
            );
        }
    }
}
