//! Launcher trait for executing commands

use crate::command::Command;
use crate::error::Result;
use crate::process::{ExitResult, ProcessHandle};
use async_trait::async_trait;
use std::path::PathBuf;

/// Something that can run external programs.
///
/// The trait is object safe so orchestration code can hold an
/// `Arc<dyn Launcher>` and tests can substitute a scripted implementation.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Run a command to completion, capturing stdout and stderr.
    ///
    /// A non-zero exit is not an error here; inspect [`ExitResult::status`].
    async fn execute(&self, command: &Command) -> Result<ExitResult>;

    /// Start a long-lived background process and return a handle to it
    async fn launch(&self, command: &Command) -> Result<Box<dyn ProcessHandle>>;

    /// Find `program` on the executable search path
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// Run a command and fail with [`Error::CommandFailed`](crate::Error::CommandFailed)
    /// unless it exits with code 0
    async fn execute_checked(&self, command: &Command) -> Result<ExitResult> {
        self.execute(command).await?.into_checked(command)
    }
}
