//! Decorator killing runs when a watched file is deleted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::errors::EvalResult;
use crate::domain::models::{KillToken, LiveRun, RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Kill switch: once the watched file has existed and is then deleted,
/// every outstanding run is killed, and so is every run started afterwards.
pub struct FileWatchKillEvaluator {
    inner: Arc<dyn Evaluator>,
    state: Arc<WatchState>,
    poller: JoinHandle<()>,
}

#[derive(Default)]
struct WatchState {
    triggered: AtomicBool,
    next_batch: AtomicU64,
    running: Mutex<HashMap<u64, Vec<KillToken>>>,
}

impl WatchState {
    fn running(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Vec<KillToken>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let killed: usize = self
            .running()
            .values()
            .flatten()
            .filter(|token| token.kill())
            .count();
        warn!(killed, "Watched file deleted, killing all outstanding runs");
    }
}

async fn poll(path: PathBuf, interval: Duration, state: Arc<WatchState>) {
    let mut ticker = tokio::time::interval(interval);
    let mut seen = false;
    loop {
        ticker.tick().await;
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        match (seen, exists) {
            (false, true) => {
                info!(file = %path.display(), "Watched file found, deleting it will kill all runs");
                seen = true;
            }
            (true, false) => {
                state.trigger();
                return;
            }
            _ => {}
        }
    }
}

impl FileWatchKillEvaluator {
    /// Start watching `path`. Must be called from within a Tokio runtime.
    pub fn new(inner: Arc<dyn Evaluator>, path: PathBuf, poll_interval: Duration) -> Self {
        if !path.exists() {
            warn!(file = %path.display(), "Watched file does not exist yet, the kill switch arms once it appears");
        }
        let state = Arc::new(WatchState::default());
        let poller = tokio::spawn(poll(path, poll_interval.max(Duration::from_millis(10)), Arc::clone(&state)));
        Self { inner, state, poller }
    }

    /// Whether the watched file has been deleted.
    pub fn is_triggered(&self) -> bool {
        self.state.triggered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for FileWatchKillEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let batch = self.state.next_batch.fetch_add(1, Ordering::SeqCst);
        let state = Arc::clone(&self.state);
        let watching: ObserverHandle = Arc::new(move |runs: &[LiveRun]| {
            let tokens: Vec<KillToken> = runs
                .iter()
                .filter(|run| run.is_running())
                .map(|run| run.kill_token().clone())
                .collect();
            if state.triggered.load(Ordering::SeqCst) {
                runs.iter().for_each(LiveRun::kill);
            }
            state.running().insert(batch, tokens);
            if let Some(observer) = &observer {
                observer.current_status(runs);
            }
        });

        let result = self.inner.evaluate(requests, Some(watching)).await;
        self.state.running().remove(&batch);
        result
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }

    async fn shutdown(&self) {
        debug!("Stopping watched file poller");
        self.poller.abort();
        self.inner.shutdown().await;
    }
}

impl Drop for FileWatchKillEvaluator {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RunResult;
    use crate::services::decorators::test_support::{request, ScriptedEvaluator};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_deleting_file_kills_running_batch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kill-switch");
        std::fs::write(&path, "").unwrap();

        let inner = Arc::new(SlowBackend);
        let evaluator = Arc::new(FileWatchKillEvaluator::new(inner, path.clone(), Duration::from_millis(10)));

        let running = {
            let evaluator = Arc::clone(&evaluator);
            tokio::spawn(async move { evaluator.evaluate(vec![request("a", 1)], None).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::remove_file(&path).unwrap();

        let outcomes = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcomes[0].kind(), RunResult::Killed);
        assert!(evaluator.is_triggered());
    }

    #[tokio::test]
    async fn test_missing_file_does_not_trigger() {
        let dir = TempDir::new().unwrap();
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0).with_running_view(0.1, 0.1));
        let evaluator = FileWatchKillEvaluator::new(inner, dir.path().join("absent"), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(40)).await;

        let outcomes = evaluator.evaluate(vec![request("a", 1)], None).await.unwrap();
        assert_eq!(outcomes[0].kind(), RunResult::Sat);
        assert!(!evaluator.is_triggered());
        evaluator.shutdown().await;
    }

    /// Backend whose runs last until killed.
    struct SlowBackend;

    #[async_trait]
    impl Evaluator for SlowBackend {
        async fn evaluate(
            &self,
            requests: Vec<RunRequest>,
            observer: Option<ObserverHandle>,
        ) -> EvalResult<Vec<RunOutcome>> {
            let token = KillToken::new();
            let view = vec![LiveRun::running(requests[0].clone(), 0.0, 0.0, token.clone())];
            crate::domain::ports::notify_observer(observer.as_ref(), &view);
            token.killed().await;
            Ok(vec![RunOutcome::killed(requests[0].clone(), 0.0)])
        }
    }
}
