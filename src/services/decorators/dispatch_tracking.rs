//! Decorator recording batch and run dispatch times as CSV.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::domain::errors::EvalResult;
use crate::domain::models::{LiveRun, RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Records when runs and batches start and end, bucketed by a time
/// resolution, and writes the counts as CSV on shutdown.
pub struct DispatchTrackingEvaluator {
    inner: Arc<dyn Evaluator>,
    tracker: Arc<DispatchTracker>,
    output_file: PathBuf,
}

struct DispatchTracker {
    zero: Instant,
    zero_wall: DateTime<Utc>,
    resolution: f64,
    state: Mutex<TrackState>,
}

#[derive(Default)]
struct TrackState {
    started: HashMap<RunRequest, u64>,
    ended: HashMap<RunRequest, u64>,
    batches_started: Vec<u64>,
    batches_ended: Vec<u64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct BucketCounts {
    started: i64,
    ended: i64,
    batches_started: i64,
    batches_ended: i64,
}

impl DispatchTracker {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn bucket(&self) -> u64 {
        (self.zero.elapsed().as_secs_f64() / self.resolution).floor() as u64
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TrackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn batch_started(&self, requests: &[RunRequest]) {
        let bucket = self.bucket();
        let mut state = self.state();
        state.batches_started.push(bucket);
        for request in requests {
            state.started.entry(request.clone()).or_insert(bucket);
        }
    }

    fn runs_ended<'a>(&self, requests: impl Iterator<Item = &'a RunRequest>) {
        let bucket = self.bucket();
        let mut state = self.state();
        for request in requests {
            state.ended.entry(request.clone()).or_insert(bucket);
        }
    }

    fn batch_ended(&self) {
        let bucket = self.bucket();
        self.state().batches_ended.push(bucket);
    }

    fn render_csv(&self) -> String {
        let state = self.state();
        let mut buckets: BTreeMap<u64, BucketCounts> = BTreeMap::new();
        for bucket in state.started.values() {
            buckets.entry(*bucket).or_default().started += 1;
        }
        for bucket in state.ended.values() {
            buckets.entry(*bucket).or_default().ended += 1;
        }
        for bucket in &state.batches_started {
            buckets.entry(*bucket).or_default().batches_started += 1;
        }
        for bucket in &state.batches_ended {
            buckets.entry(*bucket).or_default().batches_ended += 1;
        }

        let mut csv = format!(
            "Time (Zero is {}), Started, Ending, Outstanding Runs, Started Batch, End Batch, Outstanding Batches\n",
            self.zero_wall.to_rfc3339()
        );
        let (mut outstanding, mut outstanding_batches) = (0_i64, 0_i64);
        for (bucket, counts) in buckets {
            outstanding += counts.started - counts.ended;
            outstanding_batches += counts.batches_started - counts.batches_ended;
            #[allow(clippy::cast_precision_loss)]
            let time = bucket as f64 * self.resolution;
            let _ = writeln!(
                csv,
                "{time},{},{},{outstanding},{},{},{outstanding_batches}",
                counts.started, counts.ended, counts.batches_started, counts.batches_ended
            );
        }
        csv
    }
}

impl DispatchTrackingEvaluator {
    /// Track dispatches into a CSV under `output_dir`.
    pub fn new(inner: Arc<dyn Evaluator>, output_dir: &Path, resolution: f64, run_number: u32) -> Self {
        let output_file = output_dir.join(format!("dispatched-runs-over-time-{run_number}.csv"));
        info!(file = %output_file.display(), "Tracking all dispatched runs");
        Self {
            inner,
            tracker: Arc::new(DispatchTracker {
                zero: Instant::now(),
                zero_wall: Utc::now(),
                resolution: if resolution > 0.0 { resolution } else { 1.0 },
                state: Mutex::new(TrackState::default()),
            }),
            output_file,
        }
    }

    /// CSV written at shutdown.
    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    async fn write_report(&self) {
        let (started, ended) = {
            let state = self.tracker.state();
            (state.started.len(), state.ended.len())
        };
        if started > ended {
            warn!(started, ended, "Some runs are still outstanding at shutdown");
        }
        if started < ended {
            error!(started, ended, "More runs ended than started, dispatch tracking is inconsistent");
            return;
        }

        let csv = self.tracker.render_csv();
        if let Some(parent) = self.output_file.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                error!(error = %err, dir = %parent.display(), "Could not create tracking output directory");
                return;
            }
        }
        match tokio::fs::write(&self.output_file, csv).await {
            Ok(()) => debug!(file = %self.output_file.display(), "Wrote dispatch tracking"),
            Err(err) => error!(error = %err, file = %self.output_file.display(), "Could not write dispatch tracking"),
        }
    }
}

#[async_trait]
impl Evaluator for DispatchTrackingEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        self.tracker.batch_started(&requests);

        let tracker = Arc::clone(&self.tracker);
        let tracking_observer: ObserverHandle = Arc::new(move |runs: &[LiveRun]| {
            tracker.runs_ended(runs.iter().filter(|run| !run.is_running()).map(LiveRun::request));
            if let Some(observer) = &observer {
                observer.current_status(runs);
            }
        });

        let result = self.inner.evaluate(requests, Some(tracking_observer)).await;
        if let Ok(outcomes) = &result {
            self.tracker.runs_ended(outcomes.iter().map(RunOutcome::request));
        }
        self.tracker.batch_ended();
        result
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await;
        self.write_report().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RunResult;
    use crate::services::decorators::test_support::{request, ScriptedEvaluator};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_writes_csv_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let inner = Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0));
        let evaluator = DispatchTrackingEvaluator::new(inner.clone(), dir.path(), 1.0, 7);

        evaluator
            .evaluate(vec![request("a", 1), request("a", 2)], None)
            .await
            .unwrap();
        evaluator.shutdown().await;

        assert_eq!(inner.shutdowns.load(std::sync::atomic::Ordering::SeqCst), 1);
        let csv = std::fs::read_to_string(dir.path().join("dispatched-runs-over-time-7.csv")).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("Time (Zero is "));
        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row[1], "2");
        assert_eq!(row[2], "2");
        assert_eq!(row[3], "0");
        assert_eq!(row[6], "0");
    }
}
