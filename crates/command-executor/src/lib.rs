//! Runtime-agnostic command execution library
//!
//! Commands are built as argument vectors and never passed through a shell.
//! Every external call goes through the [`Launcher`] trait so that callers can
//! swap the local backend for a scripted one in tests.

#![warn(missing_docs)]

pub mod backends;
pub mod best_effort;
pub mod command;
pub mod error;
pub mod launcher;
pub mod process;

pub use backends::{LocalLauncher, LocalProcessHandle};
pub use best_effort::{best_effort, run_best_effort};
pub use command::{Command, CommandBuilder};
pub use error::{Error, Result};
pub use launcher::Launcher;
pub use process::{ExitResult, ExitStatus, ProcessHandle};
