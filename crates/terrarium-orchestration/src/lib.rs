//! # Terrarium Orchestration
//!
//! Rolls the edge terrarium services out onto Docker Compose or a local k3d
//! cluster.
//!
//! The crate computes a dependency-ordered rollout, seeds Vault once it is
//! healthy, waits for each service to become ready and finally opens
//! `kubectl port-forward` tunnels. Every external program runs through
//! [`command_executor::Launcher`] and every HTTP call through [`HttpTransport`],
//! so whole deployments can be replayed against scripted doubles.
//!
//! ## Example
//!
//! ```rust,no_run
//! use terrarium_orchestration::{ComposeBackend, DeployContext, DeployOptions, DeploymentBackend};
//!
//! # fn example() -> Result<(), terrarium_orchestration::Error> {
//! let ctx = DeployContext::load(".", DeployOptions::default())?;
//! let report = smol::block_on(ComposeBackend.deploy(&ctx))?;
//! println!("finished in phase {}", report.phase);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod backend;
pub mod commands;
mod context;
mod health;
mod http;
pub mod manifests;
mod order;
mod secrets;
mod summary;
mod tunnel;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::{
    BackendKind, ClusterBackend, ClusterHealth, ComposeBackend, DeployPhase, DeploymentBackend,
    DeploymentReport, PhaseTracker, backend_for,
};
pub use context::{DeployContext, DeployOptions, Timings, sleep};
pub use health::{HealthStatus, HealthVerifier, ProbeStrategy};
pub use http::{BlockingHttp, HttpRequest, HttpResponse, HttpTransport, Method};
pub use order::{ResolvedOrder, has_dependents, resolve, resolve_order};
pub use secrets::{
    DatabaseCredentials, MountOutcome, SecretInitReport, SecretStore, VaultHealth,
    initialize_secrets, tls_secret,
};
pub use summary::{AccessEntry, AccessSummary};
pub use tunnel::{
    TunnelCheck, TunnelHandle, TunnelManager, TunnelPurpose, TunnelReport, TunnelSpec, plan,
};

/// Error types for orchestration operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A required tool or input is missing; raised before any side effect
    #[error("Prerequisite check failed: {0}")]
    Prerequisite(String),

    /// A provisioning command failed; nothing is rolled back
    #[error("{step} failed: `{command}`{}", render_output(.output))]
    Provisioning {
        /// Step that was running
        step: String,
        /// The command line that failed
        command: String,
        /// Captured stdout and stderr of the failing command
        output: String,
    },

    /// A resource did not become ready in time
    #[error("{resource} did not become ready{}", render_output(.diagnostics))]
    ReadinessTimeout {
        /// The resource that was waited on
        resource: String,
        /// Diagnostic dumps collected after the timeout
        diagnostics: String,
    },

    /// Secret store errors
    #[error("Secret store error: {0}")]
    SecretStore(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] terrarium_config::ConfigError),

    /// Command executor errors
    #[error("Command execution error: {0}")]
    CommandExecutor(#[from] command_executor::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

fn render_output(output: &str) -> String {
    if output.trim().is_empty() {
        String::new()
    } else {
        format!("\n{}", output.trim_end())
    }
}

impl Error {
    /// Wrap a command failure from `step` as a provisioning error
    pub fn provisioning(step: impl Into<String>, err: command_executor::Error) -> Self {
        let step = step.into();
        match err {
            command_executor::Error::CommandFailed {
                command,
                stdout,
                stderr,
                ..
            } => Error::Provisioning {
                step,
                command,
                output: join_output(&stdout, &stderr),
            },
            command_executor::Error::TimedOut { command, after } => Error::Provisioning {
                step,
                command,
                output: format!("timed out after {}s", after.as_secs()),
            },
            command_executor::Error::CommandNotFound { command } => {
                Error::Prerequisite(format!("{} is not installed", command))
            }
            other => Error::CommandExecutor(other),
        }
    }
}

pub(crate) fn join_output(stdout: &str, stderr: &str) -> String {
    match (stdout.trim(), stderr.trim()) {
        ("", err) => err.to_string(),
        (out, "") => out.to_string(),
        (out, err) => format!("{}\n{}", out, err),
    }
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_error_keeps_captured_output() {
        let err = Error::provisioning(
            "Image build",
            command_executor::Error::CommandFailed {
                command: "docker build -t edge-terrarium-logthon:latest".to_string(),
                code: Some(1),
                stdout: "Step 1/4 : FROM python:3.12".to_string(),
                stderr: "pull access denied".to_string(),
            },
        );

        assert_eq!(
            err.to_string(),
            "Image build failed: `docker build -t edge-terrarium-logthon:latest`\nStep 1/4 : FROM python:3.12\npull access denied"
        );
    }

    #[test]
    fn test_missing_tool_becomes_prerequisite() {
        let err = Error::provisioning(
            "Cluster create",
            command_executor::Error::CommandNotFound {
                command: "k3d".to_string(),
            },
        );
        assert!(matches!(err, Error::Prerequisite(ref msg) if msg == "k3d is not installed"));
    }
}
