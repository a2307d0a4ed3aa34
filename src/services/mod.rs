//! Service layer: policy decorators and the builder that stacks them.

pub mod decorators;
pub mod evaluator_builder;

pub use evaluator_builder::EvaluatorBuilder;
