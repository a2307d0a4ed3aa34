//! Composes the policy decorators around a base evaluator.
//!
//! Decorators are not commutative. From the base outwards:
//!
//! 1. unclean shutdown detector
//! 2. retry crashed runs
//! 3. abort on any crash, abort on first run crash
//! 4. response transform
//! 5. SAT verification, SAT/UNSAT consistency
//! 6. dispatch tracking
//! 7. concurrency bound
//! 8. result order check
//! 9. memory leak injection, run hash codes
//! 10. timing checker
//! 11. pre/post commands
//! 12. outstanding evaluation tracking
//! 13. request logging
//! 14. duplicate detection
//! 15. wallclock as runtime
//! 16. kill runs exceeding their cutoff
//! 17. file watch kill switch

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::adapters::evaluators::CommandLineEvaluator;
use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{Config, DecoratorOptions};
use crate::domain::ports::Evaluator;
use crate::services::decorators::{
    parse_run_hash_codes, AbortOnCrashEvaluator, AbortOnFirstRunCrashEvaluator, BoundedEvaluator,
    DispatchTrackingEvaluator, DuplicateCheckEvaluator, FileWatchKillEvaluator,
    KillExceedingCaptimeEvaluator, LeakMemoryEvaluator, OutstandingEvaluationsEvaluator,
    PrePostCommandEvaluator, RequestLoggingEvaluator, ResultOrderCheckEvaluator,
    RetryCrashedRunsEvaluator, RunHashVerifyingEvaluator, SatConsistencyEvaluator,
    TimingCheckerEvaluator, TransformEvaluator, UncleanShutdownDetector, VerifySatEvaluator,
    WalltimeAsRuntimeEvaluator,
};

/// Cutoff assumed by the timing checker when no algorithm is configured.
const DEFAULT_TIMING_CUTOFF: f64 = 300.0;

/// Builds a fully decorated evaluator from configuration.
#[derive(Debug, Clone)]
pub struct EvaluatorBuilder {
    config: Config,
    run_number: u32,
}

impl EvaluatorBuilder {
    /// Builder for the chain described by `config`.
    pub fn new(config: Config) -> Self {
        Self { config, run_number: 0 }
    }

    /// Number used to tell apart output files of separate runs.
    #[must_use]
    pub const fn with_run_number(mut self, run_number: u32) -> Self {
        self.run_number = run_number;
        self
    }

    /// Decorator options the chain is built from.
    pub const fn options(&self) -> &DecoratorOptions {
        &self.config.decorators
    }

    /// Build the command line backend and decorate it.
    pub async fn build(&self) -> EvalResult<Arc<dyn Evaluator>> {
        let execution = self.config.algorithm.clone().ok_or_else(|| {
            EvaluatorError::InvalidConfiguration("no target algorithm configured".to_string())
        })?;
        let base = CommandLineEvaluator::new(
            execution,
            self.config.command_line.clone(),
            self.config.kill_commands.clone(),
        )?;
        self.decorate(Arc::new(base)).await
    }

    /// Wrap `base` in every decorator the options enable.
    pub async fn decorate(&self, base: Arc<dyn Evaluator>) -> EvalResult<Arc<dyn Evaluator>> {
        let options = &self.config.decorators;
        let mut evaluator = base;

        if options.unclean_shutdown_check {
            evaluator = Arc::new(UncleanShutdownDetector::new(evaluator));
        }

        if options.retry_count > 0 {
            debug!(retries = options.retry_count, "Retrying crashed runs");
            evaluator = Arc::new(RetryCrashedRunsEvaluator::new(evaluator, options.retry_count));
        }

        if options.abort_on_crash {
            evaluator = Arc::new(AbortOnCrashEvaluator::new(evaluator));
            if options.abort_on_first_run_crash {
                warn!("Abort on crash is on, abort on first run crash adds nothing");
            }
        }
        if options.abort_on_first_run_crash {
            evaluator = Arc::new(AbortOnFirstRunCrashEvaluator::new(evaluator));
        }

        if !options.transform.is_empty() {
            evaluator = Arc::new(TransformEvaluator::new(evaluator, options.transform.clone()));
        }

        match options.verify_sat {
            Some(true) => evaluator = Arc::new(VerifySatEvaluator::new(evaluator)),
            None => evaluator = Arc::new(VerifySatEvaluator::auto(evaluator)),
            Some(false) => {}
        }
        if options.check_sat_consistency {
            evaluator = Arc::new(SatConsistencyEvaluator::new(
                evaluator,
                options.check_sat_consistency_exception,
            ));
        }

        if options.track_scheduled_runs {
            evaluator = Arc::new(DispatchTrackingEvaluator::new(
                evaluator,
                &options.output_dir,
                options.track_scheduled_runs_resolution,
                self.run_number,
            ));
        }

        if options.bound_runs {
            evaluator = Arc::new(BoundedEvaluator::new(evaluator, options.max_concurrent_algo_execs)?);
        }

        if options.check_result_order_consistent {
            evaluator = Arc::new(ResultOrderCheckEvaluator::new(evaluator));
        }

        if options.leak_memory {
            evaluator = Arc::new(LeakMemoryEvaluator::new(evaluator, options.leak_memory_amount));
        }
        if options.run_hash_codes_file.is_some() || options.log_run_hash_codes {
            let expected = match &options.run_hash_codes_file {
                Some(path) => parse_run_hash_codes(path)
                    .map_err(|err| EvaluatorError::InvalidConfiguration(format!("{err:#}")))?,
                None => VecDeque::new(),
            };
            evaluator = Arc::new(RunHashVerifyingEvaluator::new(
                evaluator,
                expected,
                options.log_run_hash_codes,
            ));
        }

        let cutoff = self
            .config
            .algorithm
            .as_ref()
            .map_or(DEFAULT_TIMING_CUTOFF, |algorithm| algorithm.cutoff);
        evaluator = Arc::new(TimingCheckerEvaluator::new(evaluator, cutoff));

        evaluator = Arc::new(
            PrePostCommandEvaluator::new(
                evaluator,
                options.pre_command.as_deref(),
                options.post_command.clone(),
                options.pre_post_exec_dir.clone(),
                options.pre_post_exception_on_error,
            )
            .await?,
        );

        if !options.skip_outstanding_eval_tae {
            evaluator = Arc::new(OutstandingEvaluationsEvaluator::new(evaluator));
        }

        if options.log_requests_responses || options.log_requests_responses_rc_only {
            evaluator = Arc::new(RequestLoggingEvaluator::new(
                evaluator,
                options.log_requests_responses_rc_only,
            ));
        }

        if options.check_for_duplicates {
            evaluator = Arc::new(DuplicateCheckEvaluator::new(
                evaluator,
                options.check_for_duplicates_exception,
            ));
        } else {
            warn!("Not checking for duplicate requests; duplicates in a batch may be evaluated twice");
        }

        if options.use_walltime_if_no_runtime {
            evaluator = Arc::new(WalltimeAsRuntimeEvaluator::new(
                evaluator,
                options.walltime_scaling_factor,
                options.walltime_delay,
            ));
        }

        if options.kill_runs_exceeding_captime {
            evaluator = Arc::new(KillExceedingCaptimeEvaluator::new(
                evaluator,
                options.kill_runs_exceeding_captime_factor,
            )?);
        }

        if let Some(path) = &options.file_to_watch {
            evaluator = Arc::new(FileWatchKillEvaluator::new(
                evaluator,
                path.clone(),
                Duration::from_millis(options.file_poll_interval_ms),
            ));
        }

        info!(
            observable = evaluator.are_runs_observable(),
            final_runs = evaluator.is_run_final(),
            "Target algorithm evaluator ready"
        );
        Ok(evaluator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::evaluators::ConstantEvaluator;
    use crate::domain::models::{ExecutionConfig, ParamConfiguration, ProblemInstance, RunRequest, RunResult};

    fn request(seed: i64) -> RunRequest {
        RunRequest::new(ProblemInstance::new("inst"), seed, 5.0, ParamConfiguration::new()).unwrap()
    }

    #[tokio::test]
    async fn test_default_chain_evaluates_and_shuts_down() {
        let builder = EvaluatorBuilder::new(Config::default());
        let evaluator = builder
            .decorate(Arc::new(ConstantEvaluator::default()))
            .await
            .unwrap();

        let outcomes = evaluator.evaluate(vec![request(1), request(2)], None).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].kind(), RunResult::Sat);
        assert_eq!(evaluator.outstanding_batches().unwrap(), 0);
        assert_eq!(evaluator.run_count(), 2);
        evaluator.shutdown().await;
    }

    #[tokio::test]
    async fn test_default_chain_rejects_duplicates() {
        let evaluator = EvaluatorBuilder::new(Config::default())
            .decorate(Arc::new(ConstantEvaluator::default()))
            .await
            .unwrap();
        let err = evaluator
            .evaluate(vec![request(1), request(1)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::DuplicateRequests(_)));
        evaluator.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_kill_factor_rejected() {
        let mut config = Config::default();
        config.decorators.kill_runs_exceeding_captime_factor = 0.5;
        let result = EvaluatorBuilder::new(config)
            .decorate(Arc::new(ConstantEvaluator::default()))
            .await;
        assert!(matches!(result, Err(EvaluatorError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_build_requires_algorithm() {
        let result = EvaluatorBuilder::new(Config::default()).build().await;
        assert!(matches!(result, Err(EvaluatorError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_missing_exec_dir() {
        let config = Config {
            algorithm: Some(ExecutionConfig::new("./wrapper.sh", "/definitely/not/here")),
            ..Config::default()
        };
        let result = EvaluatorBuilder::new(config).build().await;
        assert!(matches!(result, Err(EvaluatorError::InvalidExecDir(_))));
    }
}
