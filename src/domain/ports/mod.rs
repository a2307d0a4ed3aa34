//! Port trait definitions (Hexagonal Architecture)
//!
//! - Evaluator: the batch evaluation interface shared by backends and policy decorators
//! - RunObserver: push subscription for snapshots of in-flight runs

pub mod evaluator;
pub mod run_observer;

pub use evaluator::{evaluate_via_submit, EvaluationCallback, Evaluator};
pub use run_observer::{notify_observer, ObserverHandle, RunObserver};
