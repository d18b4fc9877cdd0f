//! Deployment backends.
//!
//! Each backend drives one target (Docker Compose or a k3d cluster) through
//! a fixed sequence of [`DeployPhase`]s. A failing step stops the sequence;
//! nothing is rolled back.

pub mod cluster;
pub mod compose;

pub use cluster::{ClusterBackend, ClusterHealth};
pub use compose::ComposeBackend;

use crate::commands::docker;
use crate::context::DeployContext;
use crate::secrets::{SecretInitReport, initialize_secrets, tls_secret};
use crate::summary::AccessSummary;
use crate::tunnel::{TunnelHandle, TunnelReport};
use crate::{Error, Result};
use async_trait::async_trait;
use command_executor::{Command, ExitResult};
use std::fmt;
use std::path::{Path, PathBuf};
use terrarium_config::{ImageSource, SecretsFile};
use tracing::{debug, error, info, warn};

/// Steps of a deployment, in the order they are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployPhase {
    /// Nothing has run yet
    Idle,
    /// Required tools and inputs are present
    PrereqsChecked,
    /// The other backend's leftovers were removed
    Cleaned,
    /// The cluster's state is known
    ClusterChecked,
    /// The cluster exists and answers API calls
    ClusterReady,
    /// The ingress controller is running
    IngressDeployed,
    /// Generated configuration is present
    ConfigGenerated,
    /// Local images were built
    ImagesBuilt,
    /// Built images were loaded into the cluster
    ImagesImported,
    /// The application namespace exists
    NamespaceEnsured,
    /// Vault is running
    CoreInfraStarted,
    /// Vault holds the configured secrets
    SecretsInitialized,
    /// Every service reported ready
    AllServicesStarted,
    /// Port forwards are open
    TunnelsEstablished,
    /// The running state was checked
    Verified,
    /// Finished successfully
    Done,
    /// Stopped by an error
    Failed,
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployPhase::Idle => "idle",
            DeployPhase::PrereqsChecked => "prerequisites checked",
            DeployPhase::Cleaned => "cleaned",
            DeployPhase::ClusterChecked => "cluster checked",
            DeployPhase::ClusterReady => "cluster ready",
            DeployPhase::IngressDeployed => "ingress deployed",
            DeployPhase::ConfigGenerated => "configuration present",
            DeployPhase::ImagesBuilt => "images built",
            DeployPhase::ImagesImported => "images imported",
            DeployPhase::NamespaceEnsured => "namespace ensured",
            DeployPhase::CoreInfraStarted => "core infrastructure started",
            DeployPhase::SecretsInitialized => "secrets initialized",
            DeployPhase::AllServicesStarted => "all services started",
            DeployPhase::TunnelsEstablished => "tunnels established",
            DeployPhase::Verified => "verified",
            DeployPhase::Done => "done",
            DeployPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Records the phases a deploy passes through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTracker {
    current: DeployPhase,
    history: Vec<DeployPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    /// Tracker in [`DeployPhase::Idle`]
    pub fn new() -> Self {
        Self {
            current: DeployPhase::Idle,
            history: vec![DeployPhase::Idle],
        }
    }

    /// Move to `phase`
    pub fn advance(&mut self, phase: DeployPhase) {
        debug!("Deploy phase: {} -> {}", self.current, phase);
        self.current = phase;
        self.history.push(phase);
    }

    /// Move to [`DeployPhase::Failed`], logging where it happened
    pub fn fail(&mut self, err: &Error) {
        error!("Deployment failed after {}: {}", self.current, err);
        self.advance(DeployPhase::Failed);
    }

    /// Current phase
    pub fn current(&self) -> DeployPhase {
        self.current
    }

    /// Every phase reached, starting with [`DeployPhase::Idle`]
    pub fn history(&self) -> &[DeployPhase] {
        &self.history
    }
}

/// Which backend to deploy to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Docker Compose
    Compose,
    /// k3d cluster
    Cluster,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Compose => f.write_str("compose"),
            BackendKind::Cluster => f.write_str("cluster"),
        }
    }
}

/// Outcome of a successful deploy
#[derive(Debug)]
pub struct DeploymentReport {
    /// Backend that ran
    pub backend: BackendKind,
    /// Final phase
    pub phase: DeployPhase,
    /// Every phase reached
    pub phases: Vec<DeployPhase>,
    /// Rollout order used
    pub order: Vec<String>,
    /// Open tunnels; the processes outlive the report unless torn down
    pub tunnels: Vec<TunnelHandle>,
    /// Tunnel verification results
    pub tunnel_report: Option<TunnelReport>,
    /// Dashboard bearer token
    pub dashboard_token: Option<String>,
    /// What secret initialization did
    pub secrets: Option<SecretInitReport>,
    /// Where services can be reached
    pub summary: AccessSummary,
    /// Soft failures encountered along the way
    pub warnings: Vec<String>,
}

/// A deployment target
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> BackendKind;

    /// Run the deployment to completion
    async fn deploy(&self, ctx: &DeployContext) -> Result<DeploymentReport>;
}

/// The backend implementing `kind`
pub fn backend_for(kind: BackendKind) -> Box<dyn DeploymentBackend> {
    match kind {
        BackendKind::Compose => Box::new(ComposeBackend),
        BackendKind::Cluster => Box::new(ClusterBackend),
    }
}

/// Collects soft failures while logging them
#[derive(Debug, Default)]
pub(crate) struct Warnings(Vec<String>);

impl Warnings {
    pub(crate) fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.0.push(message);
    }

    pub(crate) fn into_inner(self) -> Vec<String> {
        self.0
    }
}

/// Run `command`, turning a spawn failure or non-zero exit into a
/// provisioning error for `step`
pub(crate) async fn run_checked(
    ctx: &DeployContext,
    step: &str,
    command: &Command,
) -> Result<ExitResult> {
    debug!("Running `{}`", command);
    let result = ctx
        .launcher
        .execute_checked(command)
        .await
        .map_err(|e| Error::provisioning(step, e))?;
    if !result.stdout_trimmed().is_empty() {
        debug!("{}", result.stdout_trimmed());
    }
    Ok(result)
}

/// Run `command` and return its output whatever the exit code; spawn
/// failures are reported as the output
pub(crate) async fn capture(ctx: &DeployContext, command: &Command) -> String {
    match ctx.launcher.execute(command).await {
        Ok(result) => format!("$ {}\n{}", command, result.combined_output()),
        Err(e) => format!("$ {}\n{}", command, e),
    }
}

/// Fail unless every tool is on the search path and the Docker daemon answers
pub(crate) async fn check_prerequisites(ctx: &DeployContext, tools: &[&str]) -> Result<()> {
    let missing: Vec<&str> = tools
        .iter()
        .copied()
        .filter(|tool| ctx.launcher.locate(tool).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(Error::Prerequisite(format!(
            "required tools not installed: {}",
            missing.join(", ")
        )));
    }

    let info = docker(["info"]);
    match ctx.launcher.execute(&info).await {
        Ok(result) if result.success() => {}
        Ok(result) => {
            return Err(Error::Prerequisite(format!(
                "Docker is not running: {}",
                result.combined_output()
            )));
        }
        Err(e) => return Err(Error::Prerequisite(format!("Docker is not available: {}", e))),
    }

    info!("Prerequisites satisfied: {}", tools.join(", "));
    Ok(())
}

/// Paths of the gateway certificate and key, which must already exist
pub(crate) fn ensure_certificates(ctx: &DeployContext) -> Result<(PathBuf, PathBuf)> {
    let cert = ctx.layout.cert_file(&ctx.settings);
    let key = ctx.layout.key_file(&ctx.settings);
    for path in [&cert, &key] {
        if !path.is_file() {
            return Err(Error::Prerequisite(format!(
                "TLS material not found at {}; generate certificates first",
                path.display()
            )));
        }
    }
    Ok((cert, key))
}

/// Fail unless generated configuration exists at `path`
pub(crate) fn ensure_generated(path: &Path, what: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::Prerequisite(format!(
            "{} not found at {}; generate configuration first",
            what,
            path.display()
        )))
    }
}

/// `docker build` every descriptor with a build context; returns the built references
pub(crate) async fn build_images(ctx: &DeployContext) -> Result<Vec<String>> {
    let mut built = Vec::new();
    for service in &ctx.services {
        match &service.image {
            ImageSource::Build {
                context,
                dockerfile,
                ..
            } => {
                let reference = service.image_ref();
                let context = ctx.layout.resolve(context);
                info!("Building {}", reference);
                let build = Command::builder("docker")
                    .arg("build")
                    .arg("-t")
                    .arg(&reference)
                    .arg("-f")
                    .arg(context.join(dockerfile))
                    .arg(&context)
                    .build();
                run_checked(ctx, "Image build", &build).await?;
                built.push(reference);
            }
            ImageSource::Prebuilt { .. } => {
                info!(
                    "Skipping build for {} (uses image {})",
                    service.name,
                    service.image_ref()
                );
            }
        }
    }
    Ok(built)
}

/// Seed Vault with the secrets file, the TLS material and database credentials
pub(crate) async fn seed_secrets(ctx: &DeployContext) -> Result<SecretInitReport> {
    let secrets = SecretsFile::load(ctx.layout.secrets_file())?;
    let tls = tls_secret(
        &ctx.layout.cert_file(&ctx.settings),
        &ctx.layout.key_file(&ctx.settings),
    )?;
    initialize_secrets(&ctx.secret_store(), &secrets, tls, &ctx.services).await
}
