//! `kubectl port-forward` tunnels from localhost into the cluster

use crate::commands::port_forward;
use crate::context::{Timings, sleep};
use crate::http::{HttpRequest, HttpTransport};
use crate::{Error, Result};
use command_executor::{Command, Launcher, ProcessHandle, best_effort, run_best_effort};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use terrarium_config::{ServiceDescriptor, Settings};
use tracing::{debug, info, warn};

/// Command line every tunnel process carries, used to find stale ones
pub const TUNNEL_SIGNATURE: &str = "kubectl port-forward";

/// Namespace and service of the Kubernetes dashboard
pub const DASHBOARD_NAMESPACE: &str = "kubernetes-dashboard";

/// What a tunnel exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelPurpose {
    /// The NGINX gateway, the primary entry point
    Gateway,
    /// A single service declaring `port_forward`
    Direct,
    /// The Vault API
    Vault,
    /// The Kubernetes dashboard
    Dashboard,
}

/// One local-to-remote port forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    /// Port on localhost
    pub local_port: u16,
    /// Port of the remote service
    pub remote_port: u16,
    /// Kubernetes service name
    pub remote_service: String,
    /// Namespace of the service
    pub namespace: String,
    /// What the tunnel is for
    pub purpose: TunnelPurpose,
    /// Path requested when verifying the tunnel
    pub probe_path: String,
}

impl TunnelSpec {
    /// `svc/nginx <gateway_port>:443`
    pub fn gateway(settings: &Settings) -> Self {
        Self {
            local_port: settings.gateway_port,
            remote_port: 443,
            remote_service: "nginx".to_string(),
            namespace: settings.namespace.clone(),
            purpose: TunnelPurpose::Gateway,
            probe_path: settings.gateway_probe_path.clone(),
        }
    }

    /// `svc/<name> <port_forward>:<port>`, if the service asks for one
    pub fn direct(settings: &Settings, service: &ServiceDescriptor) -> Option<Self> {
        let local_port = service.runtime.port_forward?;
        Some(Self {
            local_port,
            remote_port: service.runtime.port,
            remote_service: service.name.clone(),
            namespace: settings.namespace.clone(),
            purpose: TunnelPurpose::Direct,
            probe_path: service.runtime.health_check_path.clone(),
        })
    }

    /// `svc/vault <vault_port>:8200`
    pub fn vault(settings: &Settings) -> Self {
        Self {
            local_port: settings.vault_port,
            remote_port: 8200,
            remote_service: "vault".to_string(),
            namespace: settings.namespace.clone(),
            purpose: TunnelPurpose::Vault,
            probe_path: "/v1/sys/health".to_string(),
        }
    }

    /// `svc/kubernetes-dashboard <dashboard_port>:443`
    pub fn dashboard(settings: &Settings) -> Self {
        Self {
            local_port: settings.dashboard_port,
            remote_port: 443,
            remote_service: DASHBOARD_NAMESPACE.to_string(),
            namespace: DASHBOARD_NAMESPACE.to_string(),
            purpose: TunnelPurpose::Dashboard,
            probe_path: "/".to_string(),
        }
    }

    /// The `kubectl port-forward` command
    pub fn command(&self) -> Command {
        port_forward(
            &self.namespace,
            &self.remote_service,
            self.local_port,
            self.remote_port,
        )
    }

    /// Request used to verify the tunnel
    pub fn probe_request(&self, host_name: &str, timeout: Duration) -> HttpRequest {
        match self.purpose {
            TunnelPurpose::Gateway => HttpRequest::get(format!(
                "https://localhost:{}{}",
                self.local_port, self.probe_path
            ))
            .header("Host", host_name)
            .insecure(),
            TunnelPurpose::Dashboard => HttpRequest::get(format!(
                "https://localhost:{}{}",
                self.local_port, self.probe_path
            ))
            .insecure(),
            TunnelPurpose::Direct | TunnelPurpose::Vault => HttpRequest::get(format!(
                "http://localhost:{}{}",
                self.local_port, self.probe_path
            )),
        }
        .timeout(timeout)
    }
}

impl fmt::Display for TunnelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "localhost:{} -> {}/svc/{}:{}",
            self.local_port, self.namespace, self.remote_service, self.remote_port
        )
    }
}

/// Tunnels a deploy opens: the gateway, then one per `port_forward`
pub fn plan(settings: &Settings, services: &[ServiceDescriptor]) -> Vec<TunnelSpec> {
    std::iter::once(TunnelSpec::gateway(settings))
        .chain(
            services
                .iter()
                .filter_map(|service| TunnelSpec::direct(settings, service)),
        )
        .collect()
}

/// A running tunnel process
pub struct TunnelHandle {
    spec: TunnelSpec,
    process: Box<dyn ProcessHandle>,
}

impl fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("spec", &self.spec)
            .field("pid", &self.process.pid())
            .finish()
    }
}

impl TunnelHandle {
    /// What the tunnel forwards
    pub fn spec(&self) -> &TunnelSpec {
        &self.spec
    }

    /// Process ID of the `kubectl` process
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Whether the `kubectl` process is still alive
    pub fn is_running(&mut self) -> bool {
        self.process.is_running()
    }
}

/// Result of probing one tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelCheck {
    /// The tunnel probed
    pub spec: TunnelSpec,
    /// HTTP status received, if any
    pub status: Option<u16>,
    /// Transport error, if the request failed
    pub error: Option<String>,
}

impl TunnelCheck {
    /// Whether the probe returned 200
    pub fn reachable(&self) -> bool {
        self.status == Some(200)
    }
}

/// Results of [`TunnelManager::verify`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelReport {
    /// One check per tunnel, in handle order
    pub checks: Vec<TunnelCheck>,
}

impl TunnelReport {
    /// Whether every tunnel answered 200
    pub fn all_reachable(&self) -> bool {
        self.checks.iter().all(TunnelCheck::reachable)
    }
}

/// Opens, verifies and tears down tunnels
pub struct TunnelManager {
    launcher: Arc<dyn Launcher>,
    http: Arc<dyn HttpTransport>,
    timings: Timings,
}

impl TunnelManager {
    /// Manager using `launcher` for `kubectl` and `http` for verification
    pub fn new(launcher: Arc<dyn Launcher>, http: Arc<dyn HttpTransport>, timings: Timings) -> Self {
        Self {
            launcher,
            http,
            timings,
        }
    }

    /// Kill every process whose command line contains the tunnel signature
    pub async fn kill_stale(&self) {
        let pkill = Command::builder("pkill")
            .arg("-f")
            .arg(TUNNEL_SIGNATURE)
            .build();
        if run_best_effort(self.launcher.as_ref(), &pkill).await {
            debug!("Stopped previous port forwards");
        }
        sleep(self.timings.tunnel_settle).await;
    }

    /// Start a single tunnel
    pub async fn open(&self, spec: TunnelSpec) -> Result<TunnelHandle> {
        let command = spec.command();
        debug!("Starting `{}`", command);
        let process = self
            .launcher
            .launch(&command)
            .await
            .map_err(|e| Error::provisioning("Port forward", e))?;
        info!("Port forward {} started", spec);
        Ok(TunnelHandle { spec, process })
    }

    /// Replace any previous tunnels with the gateway tunnel plus one per
    /// `port_forward`.
    ///
    /// Tunnels that fail to start are logged and skipped.
    pub async fn establish(
        &self,
        settings: &Settings,
        services: &[ServiceDescriptor],
    ) -> Vec<TunnelHandle> {
        self.kill_stale().await;

        let mut handles = Vec::new();
        for spec in plan(settings, services) {
            let label = spec.to_string();
            match self.open(spec).await {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("Could not start port forward {}: {}", label, e),
            }
        }

        sleep(self.timings.tunnel_warmup).await;
        handles
    }

    /// Probe every tunnel; failures are reported, never raised
    pub async fn verify(&self, host_name: &str, handles: &[TunnelHandle]) -> TunnelReport {
        let mut report = TunnelReport::default();
        for handle in handles {
            let request = handle
                .spec
                .probe_request(host_name, self.timings.http_timeout);
            let check = match self.http.send(request).await {
                Ok(response) => TunnelCheck {
                    spec: handle.spec.clone(),
                    status: Some(response.status),
                    error: None,
                },
                Err(e) => TunnelCheck {
                    spec: handle.spec.clone(),
                    status: None,
                    error: Some(e.to_string()),
                },
            };

            match (&check.status, &check.error) {
                (Some(200), _) => info!("Port forward {} verified", handle.spec),
                (Some(status), _) => warn!("Port forward {} returned status {}", handle.spec, status),
                (None, Some(e)) => warn!("Could not verify port forward {}: {}", handle.spec, e),
                (None, None) => {}
            }
            report.checks.push(check);
        }
        report
    }

    /// Stop exactly the given tunnels
    pub async fn teardown(&self, handles: Vec<TunnelHandle>) {
        for mut handle in handles {
            let label = format!("stopping port forward {}", handle.spec);
            best_effort(&label, handle.process.terminate()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedLauncher, ScriptedTransport, descriptor};

    fn forwarded(name: &str, port: u16, port_forward: u16) -> ServiceDescriptor {
        let mut service = descriptor(name, &[]);
        service.runtime.port = port;
        service.runtime.port_forward = Some(port_forward);
        service
    }

    #[test]
    fn test_plan_has_one_gateway_plus_one_per_port_forward() {
        let settings = Settings::default();
        let services = vec![
            descriptor("custom-client", &[]),
            forwarded("logthon", 5000, 5001),
            forwarded("file-storage", 9000, 9000),
        ];

        let specs = plan(&settings, &services);
        assert_eq!(specs.len(), 3);
        assert_eq!(
            specs
                .iter()
                .filter(|s| s.purpose == TunnelPurpose::Gateway)
                .count(),
            1
        );
        assert_eq!(
            specs[0].command().to_string(),
            "kubectl port-forward -n edge-terrarium svc/nginx 8443:443"
        );
        assert_eq!(
            specs[1].command().to_string(),
            "kubectl port-forward -n edge-terrarium svc/logthon 5001:5000"
        );
    }

    #[test]
    fn test_plan_without_port_forwards_is_gateway_only() {
        let specs = plan(&Settings::default(), &[descriptor("a", &[])]);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].purpose, TunnelPurpose::Gateway);
    }

    #[test]
    fn test_gateway_probe_request() {
        let spec = TunnelSpec::gateway(&Settings::default());
        let request = spec.probe_request("edge-terrarium.local", Duration::from_secs(5));
        assert_eq!(request.url, "https://localhost:8443/api/logs/");
        assert_eq!(request.header_value("Host"), Some("edge-terrarium.local"));
        assert!(request.insecure);

        let vault = TunnelSpec::vault(&Settings::default());
        let request = vault.probe_request("edge-terrarium.local", Duration::from_secs(5));
        assert_eq!(request.url, "http://localhost:8200/v1/sys/health");
        assert!(!request.insecure);
    }

    #[smol_potat::test]
    async fn test_establish_verify_teardown() {
        let launcher = Arc::new(ScriptedLauncher::new());
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("GET https://localhost:8443/api/logs/", 200, "[]");
        transport.respond("GET http://localhost:5001/health", 502, "");

        let manager =
            TunnelManager::new(launcher.clone(), transport.clone(), Timings::immediate());
        let settings = Settings::default();
        let services = vec![forwarded("logthon", 5000, 5001)];

        let handles = manager.establish(&settings, &services).await;
        assert_eq!(handles.len(), 2);
        assert_eq!(launcher.commands(), vec!["pkill -f 'kubectl port-forward'"]);
        assert_eq!(launcher.launched().len(), 2);

        let report = manager.verify(&settings.host_name, &handles).await;
        assert!(report.checks[0].reachable());
        assert_eq!(report.checks[1].status, Some(502));
        assert!(!report.all_reachable());

        manager.teardown(handles).await;
        assert_eq!(launcher.terminated(), launcher.launched());
    }

    #[smol_potat::test]
    async fn test_establish_skips_tunnels_that_fail_to_start() {
        let launcher = Arc::new(ScriptedLauncher::new());
        launcher.missing_tool("kubectl");
        let transport = Arc::new(ScriptedTransport::new());
        let manager =
            TunnelManager::new(launcher.clone(), transport.clone(), Timings::immediate());

        let handles = manager.establish(&Settings::default(), &[]).await;
        assert!(handles.is_empty());
    }
}
