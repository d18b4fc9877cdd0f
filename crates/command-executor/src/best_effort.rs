//! Helpers for cleanup steps whose failure must never abort a deployment

use std::fmt::Display;
use std::future::Future;

use tracing::debug;

use crate::command::Command;
use crate::launcher::Launcher;

/// Await `fut`, logging and swallowing any error.
///
/// Returns true when the operation succeeded.
pub async fn best_effort<T, E, F>(label: &str, fut: F) -> bool
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match fut.await {
        Ok(_) => true,
        Err(e) => {
            debug!("Ignoring failure in {}: {}", label, e);
            false
        }
    }
}

/// Run `command`, treating spawn errors and non-zero exits as non-fatal.
///
/// Returns true only when the command ran and exited with code 0.
pub async fn run_best_effort(launcher: &dyn Launcher, command: &Command) -> bool {
    match launcher.execute(command).await {
        Ok(result) if result.success() => true,
        Ok(result) => {
            debug!(
                "Ignoring non-zero exit from `{}`: {}",
                command,
                result.combined_output()
            );
            false
        }
        Err(e) => {
            debug!("Ignoring failure running `{}`: {}", command, e);
            false
        }
    }
}
