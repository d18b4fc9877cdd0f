//! k3d cluster deployment

use super::{
    BackendKind, DeployPhase, DeploymentBackend, DeploymentReport, PhaseTracker, Warnings,
    build_images, capture, check_prerequisites, ensure_certificates, ensure_generated,
    run_checked, seed_secrets,
};
use crate::commands::{apply, docker, k3d, kubectl, kubectl_in, wait_available};
use crate::context::{DeployContext, sleep};
use crate::health::ProbeStrategy;
use crate::manifests::{
    GATEWAY_CONFIG_MANIFEST, PROTECTED_DEPLOYMENTS, PROTECTED_SERVICES, VAULT_MANIFESTS,
    plan_apply, stale_resources,
};
use crate::order::{has_dependents, resolve_order};
use crate::summary::AccessSummary;
use crate::tunnel::{DASHBOARD_NAMESPACE, TunnelHandle, TunnelSpec};
use crate::{Error, Result};
use async_trait::async_trait;
use command_executor::{Command, run_best_effort};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Upstream Kubernetes dashboard manifest
pub const DASHBOARD_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/kubernetes/dashboard/v2.7.0/aio/deploy/recommended.yaml";

/// Service account the dashboard token is issued for
pub const DASHBOARD_ACCOUNT: &str = "dashboard-admin";

/// State of the project's k3d cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterHealth {
    /// No cluster with the project name
    Absent,
    /// Listed, running and answering API calls
    Healthy,
    /// Listed but stopped or not answering
    Corrupted,
}

#[derive(Debug, Deserialize)]
struct K3dCluster {
    name: String,
    #[serde(default, rename = "serversRunning")]
    servers_running: u32,
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMetadata,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    #[serde(default)]
    phase: String,
    #[serde(default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: Option<ContainerState>,
}

#[derive(Debug, Deserialize)]
struct ContainerState {
    waiting: Option<ContainerWaiting>,
}

#[derive(Debug, Deserialize)]
struct ContainerWaiting {
    reason: Option<String>,
}

impl Pod {
    /// `<name> (<reason>)` unless the pod is running and ready, or completed
    fn problem(&self) -> Option<String> {
        let status = &self.status;
        if status.phase == "Succeeded" {
            return None;
        }
        let all_ready = !status.container_statuses.is_empty()
            && status.container_statuses.iter().all(|c| c.ready);
        if status.phase == "Running" && all_ready {
            return None;
        }

        let waiting = status.container_statuses.iter().find_map(|c| {
            c.state
                .as_ref()
                .and_then(|s| s.waiting.as_ref())
                .and_then(|w| w.reason.clone())
        });
        let reason = match (waiting, status.phase.as_str()) {
            (Some(reason), _) => reason,
            (None, "Running") => "not ready".to_string(),
            (None, "") => "Unknown".to_string(),
            (None, phase) => phase.to_string(),
        };
        Some(format!("{} ({})", self.metadata.name, reason))
    }
}

/// Deploys onto a local k3d cluster named after the project
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterBackend;

#[async_trait]
impl DeploymentBackend for ClusterBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cluster
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

impl ClusterBackend {
    async fn run(&self, ctx: &DeployContext, tracker: &mut PhaseTracker) -> Result<DeploymentReport> {
        let mut warnings = Warnings::default();
        let settings = &ctx.settings;
        let namespace = settings.namespace.as_str();

        info!("Deploying {} to k3d", settings.project_name);
        check_prerequisites(ctx, &["docker", "k3d", "kubectl", "curl"]).await?;
        let (cert, key) = ensure_certificates(ctx)?;
        tracker.advance(DeployPhase::PrereqsChecked);

        info!("Stopping any Docker Compose deployment");
        run_best_effort(ctx.launcher.as_ref(), &ctx.compose().command(["down", "-v"])).await;
        tracker.advance(DeployPhase::Cleaned);

        let health = self.check_cluster_health(ctx).await;
        tracker.advance(DeployPhase::ClusterChecked);
        match health {
            ClusterHealth::Healthy => info!("k3d cluster already exists and is healthy"),
            ClusterHealth::Corrupted => {
                warnings.push("k3d cluster exists but is not reachable, recreating it");
                self.cleanup_corrupted(ctx).await;
                self.create_cluster(ctx, &mut warnings).await?;
            }
            ClusterHealth::Absent => self.create_cluster(ctx, &mut warnings).await?,
        }
        tracker.advance(DeployPhase::ClusterReady);

        self.deploy_ingress(ctx).await?;
        tracker.advance(DeployPhase::IngressDeployed);

        let k3s_dir = ctx.layout.k3s_dir();
        ensure_generated(&k3s_dir, "Cluster manifests")?;
        tracker.advance(DeployPhase::ConfigGenerated);

        if ctx.options.build {
            let built = build_images(ctx).await?;
            info!("Built {} images", built.len());
            tracker.advance(DeployPhase::ImagesBuilt);
            self.import_images(ctx, &mut warnings).await?;
            tracker.advance(DeployPhase::ImagesImported);
        } else {
            info!("Skipping image builds");
        }

        info!("Ensuring namespace {}", namespace);
        run_best_effort(
            ctx.launcher.as_ref(),
            &kubectl(["create", "namespace", namespace]),
        )
        .await;
        let tls = kubectl_in(
            namespace,
            [
                "create".to_string(),
                "secret".to_string(),
                "tls".to_string(),
                settings.tls_secret_name.clone(),
                format!("--cert={}", cert.display()),
                format!("--key={}", key.display()),
            ],
        );
        run_best_effort(ctx.launcher.as_ref(), &tls).await;
        tracker.advance(DeployPhase::NamespaceEnsured);

        let gateway_config = k3s_dir.join(GATEWAY_CONFIG_MANIFEST);
        if gateway_config.is_file() {
            run_checked(ctx, "Gateway configuration", &apply(&gateway_config)).await?;
        }
        let vault_tunnel = self.start_vault(ctx, &mut warnings).await?;
        tracker.advance(DeployPhase::CoreInfraStarted);

        let secrets = seed_secrets(ctx).await?;
        for (path, reason) in &secrets.failed {
            warnings.push(format!("Secret {} was not stored: {}", path, reason));
        }
        tracker.advance(DeployPhase::SecretsInitialized);

        self.prune_stale(ctx).await;

        for (kind, path) in plan_apply(&k3s_dir)? {
            debug!("Applying {} ({})", path.display(), kind.label());
            run_checked(ctx, "Manifest apply", &apply(&path)).await?;
        }
        self.check_storage_claims(ctx).await?;

        let order = resolve_order(&ctx.services);
        if !order.is_complete() {
            warnings.push(format!(
                "Dependencies of {} could not be resolved",
                order.unresolved.join(", ")
            ));
        }
        let verifier = ctx.health_verifier(ProbeStrategy::Exec {
            namespace: namespace.to_string(),
        });
        for name in &order.order {
            self.wait_for_deployment(ctx, name).await?;
            info!("{} deployment is ready", name);
            if has_dependents(name, &ctx.services) {
                if let Some(descriptor) = ctx.service(name) {
                    if !verifier.verify(name, descriptor).await {
                        warnings.push(format!("{} did not pass its health check", name));
                    }
                }
            }
        }
        tracker.advance(DeployPhase::AllServicesStarted);

        self.report_storage_binding(ctx).await;

        let tunnel_manager = ctx.tunnels();
        tunnel_manager.teardown(vault_tunnel.into_iter().collect()).await;
        let mut tunnels = tunnel_manager.establish(settings, &ctx.services).await;
        match tunnel_manager.open(TunnelSpec::vault(settings)).await {
            Ok(handle) => tunnels.push(handle),
            Err(e) => warnings.push(format!("Vault port forward could not be restarted: {}", e)),
        }
        let tunnel_report = tunnel_manager.verify(&settings.host_name, &tunnels).await;
        tracker.advance(DeployPhase::TunnelsEstablished);

        let dashboard_token = self.setup_dashboard_auth(ctx, &mut warnings).await;
        match tunnel_manager.open(TunnelSpec::dashboard(settings)).await {
            Ok(handle) => tunnels.push(handle),
            Err(e) => warnings.push(format!("Dashboard port forward failed: {}", e)),
        }

        self.verify_pods(ctx).await?;
        info!("K3s deployment verified");
        tracker.advance(DeployPhase::Verified);
        tracker.advance(DeployPhase::Done);

        Ok(DeploymentReport {
            backend: BackendKind::Cluster,
            phase: tracker.current(),
            phases: tracker.history().to_vec(),
            order: order.order,
            tunnels,
            tunnel_report: Some(tunnel_report),
            summary: AccessSummary::cluster(settings, &ctx.services, dashboard_token.clone()),
            dashboard_token,
            secrets: Some(secrets),
            warnings: warnings.into_inner(),
        })
    }

    /// Fail unless every pod in the namespace is running with all containers
    /// ready
    async fn verify_pods(&self, ctx: &DeployContext) -> Result<()> {
        let pods = kubectl_in(&ctx.settings.namespace, ["get", "pods", "-o", "json"]);
        let status = run_checked(ctx, "Verification", &pods).await?;
        let failure = |output: String| Error::Provisioning {
            step: "Verification".to_string(),
            command: pods.to_string(),
            output,
        };

        let list: PodList = serde_json::from_str(status.stdout.trim())
            .map_err(|e| failure(format!("unreadable pod list: {}", e)))?;
        if list.items.is_empty() {
            return Err(failure(format!("no pods in namespace {}", ctx.settings.namespace)));
        }
        let unhealthy: Vec<String> = list.items.iter().filter_map(Pod::problem).collect();
        if !unhealthy.is_empty() {
            return Err(failure(format!("pods not ready: {}", unhealthy.join(", "))));
        }
        debug!("{} pods running", list.items.len());
        Ok(())
    }

    /// Whether the project's cluster exists, runs and answers `kubectl`
    pub async fn check_cluster_health(&self, ctx: &DeployContext) -> ClusterHealth {
        let project = &ctx.settings.project_name;
        let list = k3d(["cluster", "list", "-o", "json"]);
        let output = match ctx.launcher.execute(&list).await {
            Ok(result) if result.success() => result.stdout,
            Ok(result) => {
                debug!("`{}` failed: {}", list, result.combined_output());
                return ClusterHealth::Absent;
            }
            Err(e) => {
                debug!("`{}` failed: {}", list, e);
                return ClusterHealth::Absent;
            }
        };

        let clusters: Vec<K3dCluster> = match serde_json::from_str(output.trim()) {
            Ok(clusters) => clusters,
            Err(e) => {
                debug!("Unreadable k3d cluster list: {}", e);
                return ClusterHealth::Absent;
            }
        };
        let Some(cluster) = clusters.iter().find(|c| &c.name == project) else {
            return ClusterHealth::Absent;
        };
        if cluster.servers_running == 0 {
            return ClusterHealth::Corrupted;
        }

        let cluster_info = Command::builder("kubectl")
            .arg("cluster-info")
            .timeout(ctx.timings.cluster_info_timeout)
            .build();
        match ctx.launcher.execute(&cluster_info).await {
            Ok(result) if result.success() => ClusterHealth::Healthy,
            Ok(result) => {
                debug!("Cluster not reachable: {}", result.combined_output());
                ClusterHealth::Corrupted
            }
            Err(e) => {
                debug!("Cluster not reachable: {}", e);
                ClusterHealth::Corrupted
            }
        }
    }

    /// Remove the cluster and any containers or networks it left behind
    async fn cleanup_corrupted(&self, ctx: &DeployContext) {
        let project = ctx.settings.project_name.as_str();
        let launcher = ctx.launcher.as_ref();
        info!("Cleaning up corrupted k3d cluster");

        run_best_effort(launcher, &k3d(["cluster", "stop", project])).await;
        run_best_effort(launcher, &k3d(["cluster", "delete", project])).await;

        let filter = format!("name=k3d-{}", project);
        let containers = self
            .leftover_ids(ctx, docker(["ps", "-a", "--filter", filter.as_str(), "--format", "{{.ID}}"]))
            .await;
        if !containers.is_empty() {
            let mut rm = docker(["rm", "-f"]);
            rm.args(&containers);
            run_best_effort(launcher, &rm).await;
        }

        let networks = self
            .leftover_ids(
                ctx,
                docker(["network", "ls", "--filter", filter.as_str(), "--format", "{{.ID}}"]),
            )
            .await;
        if !networks.is_empty() {
            let mut rm = docker(["network", "rm"]);
            rm.args(&networks);
            run_best_effort(launcher, &rm).await;
        }

        sleep(ctx.timings.cleanup_settle).await;
    }

    async fn leftover_ids(&self, ctx: &DeployContext, listing: Command) -> Vec<String> {
        match ctx.launcher.execute(&listing).await {
            Ok(result) if result.success() => result
                .stdout
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn create_command(&self, ctx: &DeployContext) -> Command {
        let settings = &ctx.settings;
        let mut create = k3d(["cluster", "create", settings.project_name.as_str()]);
        for (host, container) in &settings.k3s_port_mappings {
            create.arg("--port");
            create.arg(format!("{}:{}@loadbalancer", host, container));
        }
        create.args([
            "--api-port".to_string(),
            settings.k3s_api_port.to_string(),
            "--k3s-arg".to_string(),
            "--disable=traefik@server:0".to_string(),
            "--wait".to_string(),
        ]);
        create
    }

    /// Create the cluster, retrying once after cleanup if k3d reports it exists
    async fn create_cluster(&self, ctx: &DeployContext, warnings: &mut Warnings) -> Result<()> {
        let create = self.create_command(ctx);
        info!("Creating k3d cluster {}", ctx.settings.project_name);

        match ctx.launcher.execute_checked(&create).await {
            Ok(_) => {}
            Err(command_executor::Error::CommandFailed { stdout, stderr, .. })
                if stdout.contains("already exists") || stderr.contains("already exists") =>
            {
                warnings.push("Cluster creation reported an existing cluster, cleaning up and retrying");
                self.cleanup_corrupted(ctx).await;
                run_checked(ctx, "Cluster create", &create).await?;
            }
            Err(e) => return Err(Error::provisioning("Cluster create", e)),
        }
        info!("k3d cluster created");

        self.install_dashboard(ctx, warnings).await;
        Ok(())
    }

    async fn install_dashboard(&self, ctx: &DeployContext, warnings: &mut Warnings) {
        info!("Installing Kubernetes Dashboard");
        let install = kubectl(["apply", "-f", DASHBOARD_MANIFEST_URL]);
        if !run_best_effort(ctx.launcher.as_ref(), &install).await {
            warnings.push("Kubernetes Dashboard could not be installed");
            return;
        }
        let wait = wait_available(
            DASHBOARD_NAMESPACE,
            DASHBOARD_NAMESPACE,
            ctx.timings.rollout_timeout_secs,
        );
        if !run_best_effort(ctx.launcher.as_ref(), &wait).await {
            warnings.push("Kubernetes Dashboard did not become available");
        }
    }

    async fn deploy_ingress(&self, ctx: &DeployContext) -> Result<()> {
        let manifest = ctx.layout.ingress_controller_manifest();
        ensure_generated(&manifest, "Ingress controller manifest")?;
        info!("Deploying NGINX ingress controller");
        run_checked(ctx, "Ingress controller", &apply(&manifest)).await?;

        let wait = kubectl([
            "wait".to_string(),
            "--namespace".to_string(),
            "ingress-nginx".to_string(),
            "--for=condition=ready".to_string(),
            "pod".to_string(),
            "--selector=app.kubernetes.io/component=controller".to_string(),
            format!("--timeout={}s", ctx.timings.rollout_timeout_secs),
        ]);
        if run_best_effort(ctx.launcher.as_ref(), &wait).await {
            info!("NGINX ingress controller is ready");
            return Ok(());
        }
        let diagnostics = capture(
            ctx,
            &kubectl(["get", "pods", "--namespace", "ingress-nginx"]),
        )
        .await;
        Err(Error::ReadinessTimeout {
            resource: "NGINX ingress controller".to_string(),
            diagnostics,
        })
    }

    /// `k3d image import` every built image present locally
    async fn import_images(&self, ctx: &DeployContext, warnings: &mut Warnings) -> Result<()> {
        let project = ctx.settings.project_name.as_str();
        for service in ctx.services.iter().filter(|s| s.image.is_build()) {
            let reference = service.image_ref();
            let lookup = docker(["images", "-q", reference.as_str()]);
            let present = match ctx.launcher.execute(&lookup).await {
                Ok(result) => result.success() && !result.stdout_trimmed().is_empty(),
                Err(_) => false,
            };
            if !present {
                warnings.push(format!("Image {} not found locally, skipping import", reference));
                continue;
            }
            info!("Importing {} into the cluster", reference);
            run_checked(
                ctx,
                "Image import",
                &k3d(["image", "import", reference.as_str(), "-c", project]),
            )
            .await?;
        }
        Ok(())
    }

    /// Apply the Vault manifests, wait for it, and open a tunnel to it
    async fn start_vault(
        &self,
        ctx: &DeployContext,
        warnings: &mut Warnings,
    ) -> Result<Option<TunnelHandle>> {
        let k3s_dir = ctx.layout.k3s_dir();
        info!("Starting Vault");
        for manifest in VAULT_MANIFESTS {
            run_checked(ctx, "Vault start", &apply(&k3s_dir.join(manifest))).await?;
        }
        self.wait_for_deployment(ctx, "vault").await?;

        let tunnels = ctx.tunnels();
        let handle = match tunnels.open(TunnelSpec::vault(&ctx.settings)).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warnings.push(format!("Vault port forward failed: {}", e));
                None
            }
        };
        sleep(ctx.timings.tunnel_warmup).await;

        let store = ctx.secret_store();
        if !store
            .wait_until_healthy(ctx.timings.vault_poll_attempts, ctx.timings.vault_poll_interval)
            .await
        {
            warnings.push("Vault may not be ready, continuing");
        }
        Ok(handle)
    }

    /// `kubectl wait` for `deployment/<name>`; dumps its pods on timeout
    async fn wait_for_deployment(&self, ctx: &DeployContext, name: &str) -> Result<()> {
        let namespace = ctx.settings.namespace.as_str();
        info!("Waiting for {} deployment to be ready", name);
        let wait = wait_available(namespace, name, ctx.timings.rollout_timeout_secs);
        match ctx.launcher.execute(&wait).await {
            Ok(result) if result.success() => Ok(()),
            Ok(result) => {
                debug!("`{}` failed: {}", wait, result.combined_output());
                let selector = format!("app={}", name);
                let mut diagnostics = vec![result.combined_output()];
                diagnostics.push(
                    capture(ctx, &kubectl_in(namespace, ["get", "pods", "-l", selector.as_str()]))
                        .await,
                );
                diagnostics.push(
                    capture(
                        ctx,
                        &kubectl_in(namespace, ["describe", "pods", "-l", selector.as_str()]),
                    )
                    .await,
                );
                Err(Error::ReadinessTimeout {
                    resource: format!("deployment/{}", name),
                    diagnostics: diagnostics.join("\n"),
                })
            }
            Err(e) => Err(Error::provisioning("Readiness wait", e)),
        }
    }

    /// Delete deployments and services no descriptor mentions anymore
    async fn prune_stale(&self, ctx: &DeployContext) {
        let namespace = ctx.settings.namespace.as_str();
        let current: BTreeSet<String> = ctx.services.iter().map(|s| s.name.clone()).collect();

        for (kind, plural, protected) in [
            ("deployment", "deployments", PROTECTED_DEPLOYMENTS.as_slice()),
            ("service", "services", PROTECTED_SERVICES.as_slice()),
        ] {
            let list = kubectl_in(
                namespace,
                ["get", plural, "-o", "jsonpath={.items[*].metadata.name}"],
            );
            let existing = match ctx.launcher.execute(&list).await {
                Ok(result) if result.success() => result.stdout,
                _ => continue,
            };
            for name in stale_resources(existing.split_whitespace(), &current, protected) {
                info!("Removing old {}: {}", kind, name);
                run_best_effort(
                    ctx.launcher.as_ref(),
                    &kubectl_in(namespace, ["delete", kind, name.as_str()]),
                )
                .await;
            }
        }
    }

    /// Abort if any storage claim reports a `Failed` phase
    async fn check_storage_claims(&self, ctx: &DeployContext) -> Result<()> {
        let namespace = ctx.settings.namespace.as_str();
        let phases = kubectl_in(
            namespace,
            ["get", "pvc", "-o", "jsonpath={.items[*].status.phase}"],
        );
        let failed = match ctx.launcher.execute(&phases).await {
            Ok(result) => result.success() && result.stdout.contains("Failed"),
            Err(_) => false,
        };
        if failed {
            let output = capture(ctx, &kubectl_in(namespace, ["describe", "pvc"])).await;
            return Err(Error::Provisioning {
                step: "PVC provisioning".to_string(),
                command: phases.to_string(),
                output,
            });
        }
        debug!("Storage claims will bind when their pods are scheduled");
        Ok(())
    }

    /// Log how many storage claims are bound; informational only
    async fn report_storage_binding(&self, ctx: &DeployContext) {
        let namespace = ctx.settings.namespace.as_str();
        let list = kubectl_in(namespace, ["get", "pvc", "-o", "name"]);
        let claims: Vec<String> = match ctx.launcher.execute(&list).await {
            Ok(result) if result.success() => result
                .stdout
                .lines()
                .map(|line| line.trim().trim_start_matches("persistentvolumeclaim/").to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            _ => {
                info!("PVC binding status unavailable");
                return;
            }
        };
        if claims.is_empty() {
            debug!("No PVCs to verify");
            return;
        }

        let mut bound = 0;
        for claim in &claims {
            let wait = kubectl_in(
                namespace,
                [
                    "wait".to_string(),
                    "--for=condition=Bound".to_string(),
                    format!("--timeout={}s", ctx.timings.pvc_bind_timeout_secs),
                    format!("pvc/{}", claim),
                ],
            );
            if run_best_effort(ctx.launcher.as_ref(), &wait).await {
                bound += 1;
            }
        }
        if bound == claims.len() {
            info!("All {} PVCs are bound", bound);
        } else {
            info!("{} of {} PVCs are bound, the rest are still binding", bound, claims.len());
        }
    }

    /// Create the dashboard service account and return a bearer token
    async fn setup_dashboard_auth(
        &self,
        ctx: &DeployContext,
        warnings: &mut Warnings,
    ) -> Option<String> {
        let launcher = ctx.launcher.as_ref();
        run_best_effort(
            launcher,
            &kubectl_in(DASHBOARD_NAMESPACE, ["create", "serviceaccount", DASHBOARD_ACCOUNT]),
        )
        .await;
        run_best_effort(
            launcher,
            &kubectl([
                "create".to_string(),
                "clusterrolebinding".to_string(),
                DASHBOARD_ACCOUNT.to_string(),
                "--clusterrole=cluster-admin".to_string(),
                format!("--serviceaccount={}:{}", DASHBOARD_NAMESPACE, DASHBOARD_ACCOUNT),
            ]),
        )
        .await;

        let token = kubectl_in(DASHBOARD_NAMESPACE, ["create", "token", DASHBOARD_ACCOUNT]);
        match launcher.execute(&token).await {
            Ok(result) if result.success() && !result.stdout_trimmed().is_empty() => {
                info!("Kubernetes Dashboard authentication configured");
                Some(result.stdout_trimmed().to_string())
            }
            Ok(result) => {
                warnings.push(format!(
                    "Dashboard token could not be created: {}",
                    result.combined_output()
                ));
                None
            }
            Err(e) => {
                warnings.push(format!("Dashboard token could not be created: {}", e));
                None
            }
        }
    }
}
