//! Run hash codes: a rolling hash over every request and result line, used
//! to check that two configuration runs performed identical evaluations.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, error, info, trace, warn};

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

static RUN_HASH_LINE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^Run Hash Codes:(\d+)( After \d+ runs)?$"));

/// Read expected hash codes, in order, from a log or text file.
///
/// Lines that do not look like `Run Hash Codes:<h> After <n> runs` are skipped.
pub fn parse_run_hash_codes(path: &Path) -> Result<VecDeque<u64>> {
    let pattern = RUN_HASH_LINE
        .as_ref()
        .map_err(|e| anyhow!("Invalid run hash code pattern: {e}"))?;
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run hash code file {}", path.display()))?;

    let mut codes = VecDeque::new();
    for (number, line) in contents.lines().enumerate() {
        let Some(captures) = pattern.captures(line.trim_end()) else {
            trace!(line = number + 1, "No run hash code on line");
            continue;
        };
        let code = captures[1]
            .parse::<u64>()
            .with_context(|| format!("Invalid run hash code on line {}", number + 1))?;
        debug!(line = number + 1, code, "Found run hash code");
        codes.push_back(code);
    }
    if codes.is_empty() {
        warn!(file = %path.display(), "Run hash code file given, but it contains no hash codes");
    }
    Ok(codes)
}

#[derive(Debug, Default)]
struct HashState {
    hash: u64,
    runs: u64,
    expected: VecDeque<u64>,
    exhausted_logged: bool,
}

/// Folds every outcome into a rolling hash, logging it after each batch and
/// checking it against expected codes when given.
pub struct RunHashVerifyingEvaluator {
    inner: Arc<dyn Evaluator>,
    state: Mutex<HashState>,
    log_codes: bool,
}

impl RunHashVerifyingEvaluator {
    /// Verify against `expected` codes, logging each code when `log_codes` is set.
    pub fn new(inner: Arc<dyn Evaluator>, expected: VecDeque<u64>, log_codes: bool) -> Self {
        if expected.is_empty() {
            info!("Run hash codes will not be verified");
        } else {
            info!(codes = expected.len(), "Run hash codes will be verified");
        }
        Self {
            inner,
            state: Mutex::new(HashState {
                expected,
                ..HashState::default()
            }),
            log_codes,
        }
    }

    /// Current rolling hash and number of runs folded into it.
    pub fn current(&self) -> (u64, u64) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (state.hash, state.runs)
    }

    fn fold(&self, outcomes: &[RunOutcome]) -> EvalResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for outcome in outcomes {
            let mut hasher = DefaultHasher::new();
            outcome.request().hash(&mut hasher);
            outcome.result_line().hash(&mut hasher);
            state.hash = state.hash.wrapping_mul(31).wrapping_add(hasher.finish());
            state.runs += 1;
        }

        if self.log_codes {
            info!("Run Hash Codes:{} After {} runs", state.hash, state.runs);
        }

        match state.expected.pop_front() {
            Some(expected) if expected != state.hash => {
                error!(expected, computed = state.hash, runs = state.runs, "Run hash code mismatch");
                Err(EvaluatorError::RunHashMismatch {
                    runs: state.runs,
                    expected,
                    computed: state.hash,
                })
            }
            Some(_) => Ok(()),
            None => {
                if !state.exhausted_logged && state.runs > 0 {
                    state.exhausted_logged = true;
                    debug!(runs = state.runs, "No more run hash codes to verify against");
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Evaluator for RunHashVerifyingEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        let outcomes = self.inner.evaluate(requests, observer).await?;
        self.fold(&outcomes)?;
        Ok(outcomes)
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RunResult;
    use crate::services::decorators::test_support::{request, ScriptedEvaluator};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hash_line_pattern_compiles() {
        assert!(RUN_HASH_LINE.is_ok());
    }

    #[test]
    fn test_parse_hash_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "some log noise").unwrap();
        writeln!(file, "Run Hash Codes:42 After 3 runs").unwrap();
        writeln!(file, "Run Hash Codes:7").unwrap();
        writeln!(file, "prefix Run Hash Codes:9 After 1 runs").unwrap();
        file.flush().unwrap();

        let codes = parse_run_hash_codes(file.path()).unwrap();
        assert_eq!(codes, VecDeque::from(vec![42, 7]));
    }

    #[tokio::test]
    async fn test_identical_runs_reproduce_hash() {
        let first = RunHashVerifyingEvaluator::new(
            Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0)),
            VecDeque::new(),
            false,
        );
        first.evaluate(vec![request("a", 1)], None).await.unwrap();
        let (code, runs) = first.current();
        assert_eq!(runs, 1);

        let second = RunHashVerifyingEvaluator::new(
            Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0)),
            VecDeque::from(vec![code]),
            true,
        );
        assert!(second.evaluate(vec![request("a", 1)], None).await.is_ok());
    }

    #[tokio::test]
    async fn test_mismatch_fails_batch() {
        let evaluator = RunHashVerifyingEvaluator::new(
            Arc::new(ScriptedEvaluator::always(RunResult::Sat, 1.0)),
            VecDeque::from(vec![1]),
            false,
        );
        let err = evaluator.evaluate(vec![request("a", 1)], None).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::RunHashMismatch { runs: 1, expected: 1, .. }));
    }
}
