//! Command line interface of the `lexis` binary.

pub mod args;
pub mod commands;
pub mod output;

pub use args::{Command, LexisArgs, OutputFormat};
pub use commands::execute_command;
