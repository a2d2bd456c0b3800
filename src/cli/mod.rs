//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - Output formatting (summary table, field tree, JSON lines)

mod args;
mod output;

pub use args::{parse_port_override, Args};
pub use output::{OutputFormat, OutputFormatter};
