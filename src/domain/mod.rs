//! Domain layer for the evaluation engine
//!
//! This module contains the run model and the ports backends implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{EvalResult, EvaluatorError, MalformedResult, OutcomePending};
