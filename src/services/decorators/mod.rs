//! Policy decorators.
//!
//! Each decorator wraps an `Arc<dyn Evaluator>`, adds one behavior, and
//! forwards everything else to the evaluator it wraps. The order they are
//! stacked in is fixed by [`crate::services::EvaluatorBuilder`].

pub mod abort_on_crash;
pub mod abort_on_first_run_crash;
pub mod bounded;
pub mod dispatch_tracking;
pub mod duplicate_check;
pub mod file_watch_kill;
pub mod kill_exceeding_captime;
pub mod leak_memory;
pub mod outstanding;
pub mod pre_post_command;
pub mod request_logger;
pub mod result_order;
pub mod retry_crashed;
pub mod run_hash;
pub mod sat_consistency;
pub mod timing_checker;
pub mod transform;
pub mod unclean_shutdown;
pub mod verify_sat;
pub mod walltime_as_runtime;

pub use abort_on_crash::AbortOnCrashEvaluator;
pub use abort_on_first_run_crash::AbortOnFirstRunCrashEvaluator;
pub use bounded::BoundedEvaluator;
pub use dispatch_tracking::DispatchTrackingEvaluator;
pub use duplicate_check::DuplicateCheckEvaluator;
pub use file_watch_kill::FileWatchKillEvaluator;
pub use kill_exceeding_captime::KillExceedingCaptimeEvaluator;
pub use leak_memory::LeakMemoryEvaluator;
pub use outstanding::OutstandingEvaluationsEvaluator;
pub use pre_post_command::PrePostCommandEvaluator;
pub use request_logger::RequestLoggingEvaluator;
pub use result_order::ResultOrderCheckEvaluator;
pub use retry_crashed::RetryCrashedRunsEvaluator;
pub use run_hash::{parse_run_hash_codes, RunHashVerifyingEvaluator};
pub use sat_consistency::SatConsistencyEvaluator;
pub use timing_checker::TimingCheckerEvaluator;
pub use transform::TransformEvaluator;
pub use unclean_shutdown::UncleanShutdownDetector;
pub use verify_sat::VerifySatEvaluator;
pub use walltime_as_runtime::WalltimeAsRuntimeEvaluator;
