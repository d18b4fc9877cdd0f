//! Docker Compose deployment

use super::{
    BackendKind, DeployPhase, DeploymentBackend, DeploymentReport, PhaseTracker, Warnings,
    build_images, check_prerequisites, ensure_certificates, ensure_generated, run_checked,
    seed_secrets,
};
use crate::commands::k3d;
use crate::context::{DeployContext, sleep};
use crate::order::resolve_order;
use crate::summary::AccessSummary;
use crate::{Error, Result};
use async_trait::async_trait;
use command_executor::run_best_effort;
use serde::Deserialize;
use terrarium_config::ServiceDescriptor;
use tracing::{debug, info};

/// Deploys every service with `docker-compose`
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeBackend;

#[async_trait]
impl DeploymentBackend for ComposeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Compose
    }

    async fn deploy(&self, ctx: &DeployContext) -> Result<DeploymentReport> {
        let mut tracker = PhaseTracker::new();
        match self.run(ctx, &mut tracker).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }
}

impl ComposeBackend {
    async fn run(&self, ctx: &DeployContext, tracker: &mut PhaseTracker) -> Result<DeploymentReport> {
        let mut warnings = Warnings::default();
        let compose = ctx.compose();
        let project = ctx.settings.project_name.as_str();

        info!("Deploying {} with Docker Compose", project);
        check_prerequisites(ctx, &["docker", "docker-compose", "curl"]).await?;
        ensure_certificates(ctx)?;
        tracker.advance(DeployPhase::PrereqsChecked);

        info!("Stopping any k3d cluster named {}", project);
        run_best_effort(ctx.launcher.as_ref(), &k3d(["cluster", "stop", project])).await;
        run_best_effort(ctx.launcher.as_ref(), &k3d(["cluster", "delete", project])).await;
        tracker.advance(DeployPhase::Cleaned);

        ensure_generated(compose.file(), "Compose file")?;
        tracker.advance(DeployPhase::ConfigGenerated);

        if ctx.options.build {
            let built = build_images(ctx).await?;
            info!("Built {} images", built.len());
            tracker.advance(DeployPhase::ImagesBuilt);
        } else {
            info!("Skipping image builds");
        }

        if ctx.options.clean {
            info!("Removing previous containers and volumes");
            run_best_effort(ctx.launcher.as_ref(), &compose.command(["down", "-v"])).await;
        }

        info!("Starting Vault");
        run_checked(ctx, "Vault start", &compose.command(["up", "-d", "vault"])).await?;
        if !self.wait_for_vault(ctx).await {
            warnings.push("Vault may not be ready, continuing");
        }
        tracker.advance(DeployPhase::CoreInfraStarted);

        let secrets = seed_secrets(ctx).await?;
        for (path, reason) in &secrets.failed {
            warnings.push(format!("Secret {} was not stored: {}", path, reason));
        }
        tracker.advance(DeployPhase::SecretsInitialized);

        let order = resolve_order(&ctx.services);
        if !order.is_complete() {
            warnings.push(format!(
                "Dependencies of {} could not be resolved",
                order.unresolved.join(", ")
            ));
        }

        info!("Starting all services");
        run_checked(ctx, "Service start", &compose.command(["up", "-d"])).await?;
        tracker.advance(DeployPhase::AllServicesStarted);

        self.verify_running(ctx).await?;
        info!("Docker deployment verified");
        tracker.advance(DeployPhase::Verified);
        tracker.advance(DeployPhase::Done);

        Ok(DeploymentReport {
            backend: BackendKind::Compose,
            phase: tracker.current(),
            phases: tracker.history().to_vec(),
            order: order.order,
            tunnels: Vec::new(),
            tunnel_report: None,
            dashboard_token: None,
            secrets: Some(secrets),
            summary: AccessSummary::compose(&ctx.settings, &ctx.services),
            warnings: warnings.into_inner(),
        })
    }

    /// Fail unless every container, and one per descriptor, is running
    async fn verify_running(&self, ctx: &DeployContext) -> Result<()> {
        let ps = ctx.compose().command(["ps", "-a", "--format", "json"]);
        let status = run_checked(ctx, "Verification", &ps).await?;
        let failure = |output: String| Error::Provisioning {
            step: "Verification".to_string(),
            command: ps.to_string(),
            output,
        };

        let rows = parse_ps(&status.stdout)
            .map_err(|e| failure(format!("unreadable `ps` output: {}\n{}", e, status.stdout)))?;
        let stopped = not_running(&rows, &ctx.services);
        if !stopped.is_empty() {
            return Err(failure(format!(
                "services not running: {}\n{}",
                stopped.join(", "),
                status.stdout.trim_end()
            )));
        }
        debug!("{} containers running", rows.len());
        Ok(())
    }

    /// Poll `vault status` inside the container until it answers
    async fn wait_for_vault(&self, ctx: &DeployContext) -> bool {
        let status = ctx
            .compose()
            .command(["exec", "-T", "vault", "vault", "status"]);
        let attempts = ctx.timings.vault_poll_attempts;

        for attempt in 1..=attempts {
            match ctx.launcher.execute(&status).await {
                Ok(result) if result.success() => {
                    info!("Vault is ready");
                    return true;
                }
                Ok(result) => debug!(
                    "Vault not ready ({}/{}): {}",
                    attempt,
                    attempts,
                    result.combined_output()
                ),
                Err(e) => debug!("Vault not ready ({}/{}): {}", attempt, attempts, e),
            }
            if attempt < attempts {
                sleep(ctx.timings.vault_poll_interval).await;
            }
        }
        false
    }
}

/// One container row of `docker-compose ps --format json`
#[derive(Debug, Deserialize)]
struct ComposeRow {
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "State", default)]
    state: String,
}

/// Compose v2 prints either a JSON array or one object per line
fn parse_ps(output: &str) -> serde_json::Result<Vec<ComposeRow>> {
    let output = output.trim();
    if output.is_empty() {
        return Ok(Vec::new());
    }
    if output.starts_with('[') {
        return serde_json::from_str(output);
    }
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect()
}

/// `<service> (<state>)` for every stopped container and every descriptor
/// without a container
fn not_running(rows: &[ComposeRow], services: &[ServiceDescriptor]) -> Vec<String> {
    let mut stopped: Vec<String> = rows
        .iter()
        .filter(|row| !row.state.eq_ignore_ascii_case("running"))
        .map(|row| format!("{} ({})", row.service, row.state))
        .collect();
    stopped.extend(
        services
            .iter()
            .filter(|service| !rows.iter().any(|row| row.service == service.name))
            .map(|service| format!("{} (no container)", service.name)),
    );
    stopped
}
