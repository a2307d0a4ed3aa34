//! Display helpers for CLI output: tables and result colors.

pub mod colors;
pub mod table;

pub use colors::style_result;
pub use table::{list_table, render_list};
