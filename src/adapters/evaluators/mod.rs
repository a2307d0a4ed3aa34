//! Base evaluators: backends that actually produce run outcomes.

pub mod batch_runner;
pub mod command_line;
pub mod constant;
pub mod preloaded;

pub use batch_runner::BatchRunner;
pub use command_line::CommandLineEvaluator;
pub use constant::ConstantEvaluator;
pub use preloaded::{PreloadedEvaluator, PreloadedResponse};
