//! Target algorithm process management
//!
//! - Result line protocol parsing
//! - Argument vector and call string construction
//! - Concurrency slot pool
//! - UDP side channel for live CPU time
//! - Kill escalation
//! - Single-run launcher

pub mod command;
pub mod kill;
pub mod launcher;
pub mod result_line;
pub mod side_channel;
pub mod slot_pool;

pub use command::{build_argv, call_string, split_command_line, RUN_LENGTH_LIMIT};
pub use kill::ProcessKiller;
pub use launcher::{Launcher, StatusSink, MIN_OBSERVER_FREQUENCY_MS};
pub use result_line::{parse_result_line, ResultLineError, WrapperResult, RESULT_PATTERN};
pub use side_channel::{RuntimeReading, RuntimeSideChannel};
pub use slot_pool::{Slot, SlotPool};
