//! Project-wide settings and on-disk layout

use crate::{ConfigError, Result, parser::substitute_with};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings file name at the project root
pub const SETTINGS_FILE: &str = "terrarium-config.yml";

/// Global settings shared by both backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Compose project and k3d cluster name
    pub project_name: String,
    /// Kubernetes namespace for application workloads
    pub namespace: String,
    /// Virtual host served by the gateway
    pub host_name: String,
    /// Local port of the gateway tunnel
    #[serde(alias = "nginx_port")]
    pub gateway_port: u16,
    /// Local port of the Vault API
    pub vault_port: u16,
    /// Local port of the dashboard tunnel
    pub dashboard_port: u16,
    /// Kubernetes API port exposed by k3d
    pub k3s_api_port: u16,
    /// Host to load-balancer port mappings for the k3d cluster
    pub k3s_port_mappings: BTreeMap<u16, u16>,
    /// Name of the TLS secret consumed by the gateway
    pub tls_secret_name: String,
    /// Vault token sent as `X-Vault-Token`
    pub vault_token: String,
    /// Vault address; derived from `vault_port` when unset
    pub vault_addr: Option<String>,
    /// Path probed through the gateway tunnel
    pub gateway_probe_path: String,
    /// Directory holding `<project_name>.crt` and `<project_name>.key`
    pub certs_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_name: "edge-terrarium".to_string(),
            namespace: "edge-terrarium".to_string(),
            host_name: "edge-terrarium.local".to_string(),
            gateway_port: 8443,
            vault_port: 8200,
            dashboard_port: 9443,
            k3s_api_port: 6443,
            k3s_port_mappings: BTreeMap::from([(80, 80), (443, 443), (8200, 8200), (5001, 5001)]),
            tls_secret_name: "nginx-ssl".to_string(),
            vault_token: "root".to_string(),
            vault_addr: None,
            gateway_probe_path: "/api/logs/".to_string(),
            certs_dir: PathBuf::from("certs"),
        }
    }
}

impl Settings {
    /// Load `terrarium-config.yml` from `project_root`, falling back to defaults.
    ///
    /// `TERRARIUM_VAULT_ADDR` and `TERRARIUM_VAULT_TOKEN` override the file.
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(project_root, |var| std::env::var(var).ok())
    }

    /// Like [`Settings::load`] with an explicit variable lookup
    pub fn load_with<F>(project_root: impl AsRef<Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = project_root.as_ref().join(SETTINGS_FILE);
        let mut settings = if path.is_file() {
            debug!("Loading settings from {}", path.display());
            let content = std::fs::read_to_string(&path).map_err(|source| {
                ConfigError::ReadError {
                    path: path.clone(),
                    source,
                }
            })?;
            let content = substitute_with(&content, &lookup)?;
            if content.trim().is_empty() {
                Settings::default()
            } else {
                serde_yaml::from_str(&content)?
            }
        } else {
            Settings::default()
        };

        if let Some(addr) = lookup("TERRARIUM_VAULT_ADDR") {
            settings.vault_addr = Some(addr);
        }
        if let Some(token) = lookup("TERRARIUM_VAULT_TOKEN") {
            settings.vault_token = token;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Check every field, reporting all problems at once
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("project_name", &self.project_name),
            ("namespace", &self.namespace),
            ("host_name", &self.host_name),
            ("vault_token", &self.vault_token),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{} must not be empty", field));
            }
        }
        for (field, port) in [
            ("gateway_port", self.gateway_port),
            ("vault_port", self.vault_port),
            ("dashboard_port", self.dashboard_port),
            ("k3s_api_port", self.k3s_api_port),
        ] {
            if port == 0 {
                errors.push(format!("{} must be between 1 and 65535", field));
            }
        }
        if self.k3s_port_mappings.iter().any(|(h, c)| *h == 0 || *c == 0) {
            errors.push("k3s_port_mappings must not contain port 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Base URL of the Vault API
    pub fn vault_addr(&self) -> String {
        self.vault_addr
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.vault_port))
    }
}

/// Paths of the files the orchestrator consumes, relative to a project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// Layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one sub-directory per app
    pub fn apps_dir(&self) -> PathBuf {
        self.root.join("apps")
    }

    /// Generated compose file
    pub fn compose_file(&self) -> PathBuf {
        self.root.join("configs/docker/docker-compose.yml")
    }

    /// Directory of generated cluster manifests
    pub fn k3s_dir(&self) -> PathBuf {
        self.root.join("configs/k3s")
    }

    /// Ingress controller manifest, applied before the namespace exists
    pub fn ingress_controller_manifest(&self) -> PathBuf {
        self.k3s_dir().join("nginx-ingress-controller.yaml")
    }

    /// Secrets seeded into Vault
    pub fn secrets_file(&self) -> PathBuf {
        self.root.join("configs/vault-secrets.yml")
    }

    /// TLS certificate for the gateway
    pub fn cert_file(&self, settings: &Settings) -> PathBuf {
        self.root
            .join(&settings.certs_dir)
            .join(format!("{}.crt", settings.project_name))
    }

    /// TLS private key for the gateway
    pub fn key_file(&self, settings: &Settings) -> PathBuf {
        self.root
            .join(&settings.certs_dir)
            .join(format!("{}.key", settings.project_name))
    }

    /// Resolve a path from a descriptor against the project root
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }
}
