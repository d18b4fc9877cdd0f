//! Advisory health probes run after a service reports ready

use crate::commands::{kubectl, kubectl_in};
use crate::context::{Timings, sleep};
use crate::http::{HttpRequest, HttpTransport};
use command_executor::Launcher;
use std::fmt;
use std::sync::Arc;
use terrarium_config::ServiceDescriptor;
use tracing::{debug, info, warn};

/// How a service's health endpoint is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStrategy {
    /// `curl` run inside the service's first pod
    Exec {
        /// Namespace of the pods
        namespace: String,
    },
    /// Plain HTTP GET from this host
    Http {
        /// Host the service port is reachable on
        host: String,
    },
}

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// The endpoint answered successfully
    Healthy,
    /// The probe failed, with the reason
    Unhealthy(String),
}

impl HealthStatus {
    /// Whether the probe succeeded
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy(reason) => write!(f, "unhealthy: {}", reason),
        }
    }
}

/// Probes a service's readiness or liveness endpoint.
///
/// Probing never fails the caller: every problem is reported as
/// [`HealthStatus::Unhealthy`] and [`HealthVerifier::verify`] returns false.
pub struct HealthVerifier {
    strategy: ProbeStrategy,
    launcher: Arc<dyn Launcher>,
    http: Arc<dyn HttpTransport>,
    timings: Timings,
}

impl HealthVerifier {
    /// Verifier using `strategy`
    pub fn new(
        strategy: ProbeStrategy,
        launcher: Arc<dyn Launcher>,
        http: Arc<dyn HttpTransport>,
        timings: Timings,
    ) -> Self {
        Self {
            strategy,
            launcher,
            http,
            timings,
        }
    }

    /// Probe once
    pub async fn check(&self, descriptor: &ServiceDescriptor) -> HealthStatus {
        let (port, path) = descriptor.probe_endpoint();
        match &self.strategy {
            ProbeStrategy::Exec { namespace } => {
                self.check_exec(namespace, &descriptor.name, port, path).await
            }
            ProbeStrategy::Http { host } => self.check_http(host, port, path).await,
        }
    }

    /// Probe up to the configured number of attempts; true once healthy
    pub async fn verify(&self, service: &str, descriptor: &ServiceDescriptor) -> bool {
        let attempts = self.timings.health_attempts.max(1);
        let mut last = HealthStatus::Unhealthy("not probed".to_string());

        for attempt in 1..=attempts {
            last = self.check(descriptor).await;
            if last.is_healthy() {
                info!("{} health check passed", service);
                return true;
            }
            debug!("{} health probe {}/{}: {}", service, attempt, attempts, last);
            if attempt < attempts {
                sleep(self.timings.health_interval).await;
            }
        }

        warn!("{} health check failed: {}", service, last);
        false
    }

    async fn check_exec(&self, namespace: &str, app: &str, port: u16, path: &str) -> HealthStatus {
        let find_pod = kubectl_in(
            namespace,
            [
                "get".to_string(),
                "pods".to_string(),
                "-l".to_string(),
                format!("app={}", app),
                "-o".to_string(),
                "jsonpath={.items[0].metadata.name}".to_string(),
            ],
        );
        let pod = match self.launcher.execute(&find_pod).await {
            Ok(result) if result.success() && !result.stdout_trimmed().is_empty() => {
                result.stdout_trimmed().to_string()
            }
            Ok(_) => return HealthStatus::Unhealthy(format!("no pod found for {}", app)),
            Err(e) => return HealthStatus::Unhealthy(e.to_string()),
        };

        let exec = |args: Vec<String>| {
            let mut full = vec![
                "exec".to_string(),
                pod.clone(),
                "-n".to_string(),
                namespace.to_string(),
                "--".to_string(),
            ];
            full.extend(args);
            kubectl(full)
        };

        let which = exec(vec!["which".to_string(), "curl".to_string()]);
        match self.launcher.execute(&which).await {
            Ok(result) if result.success() => {}
            Ok(_) => return HealthStatus::Unhealthy(format!("curl not available in {}", pod)),
            Err(e) => return HealthStatus::Unhealthy(e.to_string()),
        }

        let curl = exec(vec![
            "curl".to_string(),
            "-f".to_string(),
            "-s".to_string(),
            format!("http://localhost:{}{}", port, path),
        ]);
        match self.launcher.execute(&curl).await {
            Ok(result) if result.success() => HealthStatus::Healthy,
            Ok(result) => HealthStatus::Unhealthy(format!(
                "{}{} not ready: {}",
                port,
                path,
                result.combined_output()
            )),
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }

    async fn check_http(&self, host: &str, port: u16, path: &str) -> HealthStatus {
        let request = HttpRequest::get(format!("http://{}:{}{}", host, port, path))
            .timeout(self.timings.http_timeout);
        match self.http.send(request).await {
            Ok(response) if response.is_success() => HealthStatus::Healthy,
            Ok(response) => HealthStatus::Unhealthy(format!("status {}", response.status)),
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }
}
