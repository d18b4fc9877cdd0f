//! # Terrarium Configuration
//!
//! Typed configuration for edge terrarium deployments.
//!
//! This crate decodes `apps/<name>/app-config.yml` files into
//! [`ServiceDescriptor`]s, loads the optional project-wide [`Settings`] and
//! the secrets file seeded into Vault. Decoding is fail-closed: every
//! structural problem in a descriptor is collected and reported together.

#![warn(missing_docs)]

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub mod parser;
pub mod secrets;
pub mod settings;

pub use parser::{load_descriptors, parse_descriptor, substitute_env_vars};
pub use secrets::{SecretData, SecretsFile};
pub use settings::{ProjectLayout, Settings};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read {path}: {source}")]
    ReadError {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// One or more validation failures, all reported at once
    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),

    /// Environment variable not found
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    /// Substitution pattern failed to compile
    #[error("Invalid substitution pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Declarative description of one deployable service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDescriptor {
    /// Unique name, also the DNS name and resource name stem
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Where the container image comes from
    pub image: ImageSource,
    /// Runtime settings
    pub runtime: Runtime,
    /// Gateway routes, in declaration order
    pub routes: Vec<Route>,
    /// Names of services that must be ready first
    pub dependencies: Vec<String>,
    /// Health checks by kind (`readiness`, `liveness`, ...)
    pub health_checks: BTreeMap<String, HealthCheck>,
    /// Persistent volumes
    pub volumes: Vec<Volume>,
    /// Databases provisioned for this service
    pub databases: Vec<DatabaseRequest>,
    /// Container environment
    pub environment: Vec<EnvVar>,
}

/// Container image source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// Built locally from a Dockerfile
    Build {
        /// Build context directory, relative to the project root
        context: PathBuf,
        /// Dockerfile name within the context
        dockerfile: String,
        /// Image repository name
        image_name: String,
        /// Image tag
        tag: String,
    },
    /// Pulled from a registry; never built or imported
    Prebuilt {
        /// Image repository name
        image_name: String,
        /// Image tag
        tag: String,
    },
}

impl ImageSource {
    /// Full image reference, `<image_name>:<tag>`
    pub fn reference(&self) -> String {
        match self {
            ImageSource::Build {
                image_name, tag, ..
            }
            | ImageSource::Prebuilt { image_name, tag } => format!("{}:{}", image_name, tag),
        }
    }

    /// Whether the image needs a local build
    pub fn is_build(&self) -> bool {
        matches!(self, ImageSource::Build { .. })
    }
}

/// Runtime settings for a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Runtime {
    /// Container port
    pub port: u16,
    /// Path served by the health endpoint
    pub health_check_path: String,
    /// Seconds allowed for startup
    pub startup_timeout: u64,
    /// Host port exposed through a direct tunnel
    pub port_forward: Option<u16>,
}

/// Gateway route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    /// Public path prefix
    pub path: String,
    /// Path on the service
    pub target: String,
    /// Whether the gateway strips `path` before proxying
    pub strip_prefix: bool,
}

/// An HTTP health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    /// Request path
    pub path: String,
    /// Container port
    pub port: u16,
    /// Probe period
    pub period_seconds: u64,
    /// Probe timeout
    pub timeout_seconds: u64,
    /// Failures tolerated before the check fails
    pub failure_threshold: u32,
}

/// A persistent volume claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    /// Volume name
    pub name: String,
    /// Mount path inside the container
    pub mount_path: String,
    /// Requested size, e.g. `1Gi`
    pub size: String,
    /// Access mode, e.g. `ReadWriteOnce`
    pub access_mode: String,
}

/// A database a service asks to have provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseRequest {
    /// Engine, `postgresql` by default
    #[serde(rename = "type")]
    pub engine: String,
    /// Database name
    pub name: String,
    /// Disabled requests are ignored
    pub enabled: bool,
    /// SQL scripts run on first start
    pub init_scripts: Vec<String>,
}

/// A container environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Where the value comes from
    pub source: EnvSource,
}

/// Source of an environment variable's value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvSource {
    /// Literal value
    Value(String),
    /// `vault:<path>#<key>`, resolved by the container at start time
    Vault {
        /// Secret path under the kv-v2 mount
        path: String,
        /// Key within the secret
        key: String,
    },
}

impl ServiceDescriptor {
    /// Full image reference, `<image_name>:<tag>`
    pub fn image_ref(&self) -> String {
        self.image.reference()
    }

    /// Manifest file name of the deployment
    pub fn deployment_manifest(&self) -> String {
        format!("{}-deployment.yaml", self.name)
    }

    /// Manifest file name of the service
    pub fn service_manifest(&self) -> String {
        format!("{}-service.yaml", self.name)
    }

    /// Manifest file name of the storage claim
    pub fn pvc_manifest(&self) -> String {
        format!("{}-pvc.yaml", self.name)
    }

    /// Port and path to probe: readiness check, then liveness check, then runtime defaults
    pub fn probe_endpoint(&self) -> (u16, &str) {
        ["readiness", "liveness"]
            .iter()
            .find_map(|kind| self.health_checks.get(*kind))
            .map(|check| (check.port, check.path.as_str()))
            .unwrap_or((self.runtime.port, self.runtime.health_check_path.as_str()))
    }

    /// Enabled database requests
    pub fn enabled_databases(&self) -> impl Iterator<Item = &DatabaseRequest> {
        self.databases.iter().filter(|db| db.enabled)
    }
}
