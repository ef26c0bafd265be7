//! External tool abstractions
//!
//! Trait-based seam over external processes, so the git layer can be driven by
//! a real `git` binary in production and by scripted output in tests.

pub mod command;

pub use command::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};
