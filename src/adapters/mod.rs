//! Adapters implementing the evaluator port against concrete backends.

pub mod evaluators;
