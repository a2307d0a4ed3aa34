//! Bounded-concurrency execution of one batch through a launcher.

use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use tracing::trace;

use crate::domain::models::{KillToken, LiveRun, RunOutcome, RunRequest};
use crate::domain::ports::ObserverHandle;
use crate::infrastructure::process::{Launcher, StatusSink};

/// Runs a batch through a launcher with bounded concurrency.
///
/// Outcomes are returned index-aligned with the requests regardless of the
/// order in which runs finish.
#[derive(Debug)]
pub struct BatchRunner {
    launcher: Arc<Launcher>,
    concurrency: usize,
}

/// Latest snapshot of every run in a batch, pushed to the observer on change.
struct BatchStatus {
    runs: Mutex<Vec<LiveRun>>,
    observer: ObserverHandle,
}

impl BatchStatus {
    fn update(&self, index: usize, live: LiveRun) {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = runs.get_mut(index) else {
            return;
        };
        if !entry.is_running() && live.is_running() {
            trace!(run = %live.request(), "Ignoring stale running snapshot of a finished run");
            return;
        }
        *entry = live;
        // held while notifying so the observer sees snapshots in order
        self.observer.current_status(&runs);
    }
}

impl BatchRunner {
    /// `concurrency` is clamped to at least one run at a time.
    pub fn new(launcher: Arc<Launcher>, concurrency: usize) -> Self {
        Self {
            launcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Run every request, pushing batch snapshots to `observer` if given.
    pub async fn run(&self, requests: Vec<RunRequest>, observer: Option<ObserverHandle>) -> Vec<RunOutcome> {
        let tokens: Vec<KillToken> = requests.iter().map(|_| KillToken::new()).collect();

        let status = observer.map(|observer| {
            let runs = requests
                .iter()
                .zip(&tokens)
                .map(|(request, token)| LiveRun::running(request.clone(), 0.0, 0.0, token.clone()))
                .collect();
            Arc::new(BatchStatus {
                runs: Mutex::new(runs),
                observer,
            })
        });

        let runs = requests.into_iter().zip(tokens).enumerate().map(|(index, (request, token))| {
            let sink: StatusSink = match &status {
                Some(status) => {
                    let status = Arc::clone(status);
                    Arc::new(move |live| status.update(index, live))
                }
                None => Arc::new(|_| {}),
            };
            let launcher = Arc::clone(&self.launcher);
            async move { launcher.run(request, token, sink).await }
        });

        stream::iter(runs).buffered(self.concurrency).collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::domain::models::{CommandLineOptions, ExecutionConfig, KillCommands, RunResult};
    use crate::infrastructure::process::{SlotPool, MIN_OBSERVER_FREQUENCY_MS};
    use crate::services::decorators::test_support::request;

    fn runner(dir: &Path, body: &str, concurrency: usize) -> BatchRunner {
        let path = dir.join("wrapper.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let options = CommandLineOptions {
            cores: concurrency,
            observer_frequency_ms: MIN_OBSERVER_FREQUENCY_MS,
            listen_for_updates: false,
            ..CommandLineOptions::default()
        };
        let launcher = Launcher::new(
            ExecutionConfig::new(format!("sh {}", path.display()), dir),
            options,
            KillCommands::default(),
            SlotPool::new(concurrency),
            KillToken::new(),
        );
        BatchRunner::new(Arc::new(launcher), concurrency)
    }

    #[tokio::test]
    async fn test_outcomes_follow_request_order() {
        let dir = TempDir::new().unwrap();
        // seed 1 finishes last
        let runner = runner(
            dir.path(),
            "if [ \"$5\" = \"1\" ]; then sleep 1; fi\necho \"Result for SMAC: SAT, 0.$5, -1, 0, $5\"",
            3,
        );
        let requests: Vec<_> = (1..=3).map(|seed| request("inst", seed)).collect();

        let outcomes = runner.run(requests.clone(), None).await;

        let seeds: Vec<_> = outcomes.iter().map(RunOutcome::seed).collect();
        assert_eq!(seeds, vec![1, 2, 3]);
        for (request, outcome) in requests.iter().zip(&outcomes) {
            assert_eq!(outcome.request(), request);
        }
    }

    #[tokio::test]
    async fn test_observer_ends_with_completed_snapshots() {
        let dir = TempDir::new().unwrap();
        let runner = runner(dir.path(), "sleep 0.2\necho \"Result for SMAC: UNSAT, 0.1, -1, 0, $5\"", 1);
        let finished = Arc::new(AtomicBool::new(false));
        let observer: ObserverHandle = {
            let finished = Arc::clone(&finished);
            Arc::new(move |runs: &[LiveRun]| {
                assert_eq!(runs.len(), 2);
                finished.store(runs.iter().all(|run| !run.is_running()), Ordering::SeqCst);
            })
        };

        let outcomes = tokio::time::timeout(
            Duration::from_secs(10),
            runner.run(vec![request("inst", 1), request("inst", 2)], Some(observer)),
        )
        .await
        .unwrap();

        assert!(outcomes.iter().all(|outcome| outcome.kind() == RunResult::Unsat));
        assert!(finished.load(Ordering::SeqCst));
    }
}
