//! Where the deployed services can be reached

use std::fmt;
use terrarium_config::{ServiceDescriptor, Settings};

/// URLs of one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEntry {
    /// Service name
    pub service: String,
    /// Gateway URLs, one per route or a default `/api/<name>/*`
    pub gateway_urls: Vec<String>,
    /// Direct tunnel URL for a routeless service declaring `port_forward`
    pub direct_url: Option<String>,
}

/// Access information printed after a successful deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSummary {
    /// Heading, naming the backend
    pub title: String,
    /// One entry per service, in descriptor order
    pub entries: Vec<AccessEntry>,
    /// Vault API URL
    pub vault_url: String,
    /// Dashboard URL, cluster deployments only
    pub dashboard_url: Option<String>,
    /// Bearer token for the dashboard
    pub dashboard_token: Option<String>,
}

impl AccessSummary {
    /// Summary for a compose deployment
    pub fn compose(settings: &Settings, services: &[ServiceDescriptor]) -> Self {
        Self::build("Docker Compose", settings, services)
    }

    /// Summary for a cluster deployment
    pub fn cluster(
        settings: &Settings,
        services: &[ServiceDescriptor],
        dashboard_token: Option<String>,
    ) -> Self {
        let mut summary = Self::build("K3s", settings, services);
        summary.dashboard_url = Some(format!("https://localhost:{}", settings.dashboard_port));
        summary.dashboard_token = dashboard_token;
        summary
    }

    fn build(backend: &str, settings: &Settings, services: &[ServiceDescriptor]) -> Self {
        let gateway = format!("https://localhost:{}/api", settings.gateway_port);
        let entries = services
            .iter()
            .map(|service| {
                if service.routes.is_empty() {
                    AccessEntry {
                        service: service.name.clone(),
                        gateway_urls: vec![format!("{}/{}/*", gateway, service.name)],
                        direct_url: service
                            .runtime
                            .port_forward
                            .map(|port| format!("http://localhost:{}/", port)),
                    }
                } else {
                    AccessEntry {
                        service: service.name.clone(),
                        gateway_urls: service
                            .routes
                            .iter()
                            .map(|route| format!("{}{}", gateway, route.path))
                            .collect(),
                        direct_url: None,
                    }
                }
            })
            .collect();

        Self {
            title: format!("{} Deployment Access Information", backend),
            entries,
            vault_url: format!("http://localhost:{}/", settings.vault_port),
            dashboard_url: None,
            dashboard_token: None,
        }
    }
}

impl fmt::Display for AccessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.title)?;
        for entry in &self.entries {
            match &entry.direct_url {
                Some(direct) => {
                    for url in &entry.gateway_urls {
                        writeln!(
                            f,
                            "  - {}: {} (via NGINX) OR {} (direct)",
                            entry.service, url, direct
                        )?;
                    }
                }
                None => {
                    for url in &entry.gateway_urls {
                        writeln!(f, "  - {}: {}", entry.service, url)?;
                    }
                }
            }
        }
        writeln!(f, "  - vault: {}", self.vault_url)?;
        if let Some(url) = &self.dashboard_url {
            writeln!(f, "  - kubernetes-dashboard: {}", url)?;
            if let Some(token) = &self.dashboard_token {
                writeln!(f, "\nKubernetes Dashboard bearer token:\n  {}", token)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::descriptor;
    use terrarium_config::Route;

    #[test]
    fn test_routes_are_listed_under_the_gateway_api_prefix() {
        let mut storage = descriptor("file-storage", &[]);
        storage.routes.push(Route {
            path: "/storage/*".to_string(),
            target: "/".to_string(),
            strip_prefix: true,
        });
        storage.routes.push(Route {
            path: "/files/*".to_string(),
            target: "/".to_string(),
            strip_prefix: true,
        });
        storage.runtime.port_forward = Some(9000);

        let summary = AccessSummary::compose(&Settings::default(), &[storage]);
        assert_eq!(
            summary.to_string(),
            "Docker Compose Deployment Access Information:\n  - file-storage: https://localhost:8443/api/storage/*\n  - file-storage: https://localhost:8443/api/files/*\n  - vault: http://localhost:8200/\n"
        );
    }

    #[test]
    fn test_services_without_routes_get_default_gateway_path() {
        let mut logthon = descriptor("logthon", &[]);
        logthon.runtime.port_forward = Some(5001);
        let worker = descriptor("worker", &[]);

        let summary = AccessSummary::compose(&Settings::default(), &[logthon, worker]);
        assert_eq!(summary.entries.len(), 2);
        assert_eq!(
            summary.to_string(),
            "Docker Compose Deployment Access Information:\n  - logthon: https://localhost:8443/api/logthon/* (via NGINX) OR http://localhost:5001/ (direct)\n  - worker: https://localhost:8443/api/worker/*\n  - vault: http://localhost:8200/\n"
        );
    }

    #[test]
    fn test_cluster_summary_includes_dashboard_token() {
        let summary = AccessSummary::cluster(&Settings::default(), &[], Some("tok".to_string()));
        let text = summary.to_string();
        assert!(text.starts_with("K3s Deployment Access Information:"));
        assert!(text.contains("kubernetes-dashboard: https://localhost:9443"));
        assert!(text.contains("bearer token:\n  tok"));
    }
}
