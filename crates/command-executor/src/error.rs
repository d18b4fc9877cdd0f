//! Error types for command execution

use std::time::Duration;
use thiserror::Error;

/// Unified error type for command execution
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// Command not found
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command that was not found
        command: String,
    },

    /// Command ran but exited unsuccessfully
    #[error("`{command}` exited with {}{}", describe_code(.code), format_output(.stdout, .stderr))]
    CommandFailed {
        /// The rendered command line
        command: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// Command exceeded its timeout and was killed
    #[error("`{command}` timed out after {}s", after.as_secs())]
    TimedOut {
        /// The rendered command line
        command: String,
        /// The configured timeout
        after: Duration,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

fn format_output(stdout: &str, stderr: &str) -> String {
    let mut rendered = String::new();
    if !stdout.trim().is_empty() {
        rendered.push_str("\nStdout: ");
        rendered.push_str(stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        rendered.push_str("\nStderr: ");
        rendered.push_str(stderr.trim_end());
    }
    rendered
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Captured stdout and stderr for failures that carry them
    pub fn captured_output(&self) -> Option<(&str, &str)> {
        match self {
            Error::CommandFailed { stdout, stderr, .. } => Some((stdout, stderr)),
            _ => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_renders_captured_output() {
        let err = Error::CommandFailed {
            command: "kubectl apply -f configs/k3s/logthon-deployment.yaml".to_string(),
            code: Some(1),
            stdout: String::new(),
            stderr: "error: the server doesn't have a resource type\n".to_string(),
        };

        let rendered = err.to_string();
        assert!(rendered.starts_with("`kubectl apply -f configs/k3s/logthon-deployment.yaml` exited with exit code 1"));
        assert!(rendered.contains("Stderr: error: the server doesn't have a resource type"));
        assert!(!rendered.contains("Stdout:"));
    }

    #[test]
    fn test_signal_termination_is_described() {
        let err = Error::CommandFailed {
            command: "sleep 60".to_string(),
            code: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "`sleep 60` exited with a signal");
    }
}
