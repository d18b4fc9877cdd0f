//! Everything a deploy needs, built once per invocation

use crate::commands::Compose;
use crate::health::{HealthVerifier, ProbeStrategy};
use crate::http::{BlockingHttp, HttpTransport};
use crate::secrets::SecretStore;
use crate::tunnel::TunnelManager;
use crate::Result;
use command_executor::{Launcher, LocalLauncher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use terrarium_config::{ProjectLayout, ServiceDescriptor, Settings, load_descriptors};
use tracing::{debug, info};

/// Sleep on the smol timer
pub async fn sleep(duration: Duration) {
    if !duration.is_zero() {
        smol::Timer::after(duration).await;
    }
}

/// Waits, retry budgets and command timeouts used by the backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// `vault status` polls during compose bring-up
    pub vault_poll_attempts: u32,
    /// Delay between Vault polls
    pub vault_poll_interval: Duration,
    /// Pause after killing stale tunnels
    pub tunnel_settle: Duration,
    /// Pause after opening tunnels, before they are used
    pub tunnel_warmup: Duration,
    /// Timeout of tunnel verification requests
    pub http_timeout: Duration,
    /// Timeout of Vault API requests
    pub vault_request_timeout: Duration,
    /// Health probe attempts per service
    pub health_attempts: u32,
    /// Delay between health probe attempts
    pub health_interval: Duration,
    /// Timeout of `kubectl cluster-info`
    pub cluster_info_timeout: Duration,
    /// Pause after removing a corrupted cluster
    pub cleanup_settle: Duration,
    /// `kubectl wait` timeout for deployments and pods, in seconds
    pub rollout_timeout_secs: u64,
    /// `kubectl wait` timeout for each storage claim, in seconds
    pub pvc_bind_timeout_secs: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            vault_poll_attempts: 30,
            vault_poll_interval: Duration::from_secs(2),
            tunnel_settle: Duration::from_secs(2),
            tunnel_warmup: Duration::from_secs(3),
            http_timeout: Duration::from_secs(5),
            vault_request_timeout: Duration::from_secs(10),
            health_attempts: 3,
            health_interval: Duration::from_secs(2),
            cluster_info_timeout: Duration::from_secs(10),
            cleanup_settle: Duration::from_secs(2),
            rollout_timeout_secs: 120,
            pvc_bind_timeout_secs: 5,
        }
    }
}

impl Timings {
    /// Same budgets with every sleep removed
    pub fn immediate() -> Self {
        Self {
            vault_poll_interval: Duration::ZERO,
            tunnel_settle: Duration::ZERO,
            tunnel_warmup: Duration::ZERO,
            health_interval: Duration::ZERO,
            cleanup_settle: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Flags from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    /// Tear the backend's previous state down before bringing it up
    pub clean: bool,
    /// Build images from their Dockerfiles
    pub build: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            clean: false,
            build: true,
        }
    }
}

/// Settings, descriptors, paths and collaborators of one deploy
#[derive(Clone)]
pub struct DeployContext {
    /// Project-wide settings
    pub settings: Settings,
    /// On-disk layout of the project
    pub layout: ProjectLayout,
    /// Every decoded service descriptor, sorted by app directory
    pub services: Vec<ServiceDescriptor>,
    /// Runs external programs
    pub launcher: Arc<dyn Launcher>,
    /// Sends HTTP requests
    pub http: Arc<dyn HttpTransport>,
    /// Command line flags
    pub options: DeployOptions,
    /// Waits and retry budgets
    pub timings: Timings,
}

impl DeployContext {
    /// Load settings and descriptors under `root` and wire up the local
    /// launcher and HTTP client
    pub fn load(root: impl Into<PathBuf>, options: DeployOptions) -> Result<Self> {
        let layout = ProjectLayout::new(root);
        let settings = Settings::load(layout.root())?;
        settings.validate()?;

        let services = load_descriptors(layout.apps_dir())?;
        info!(
            "Loaded {} service descriptors from {}",
            services.len(),
            layout.apps_dir().display()
        );
        debug!("Settings: {:?}", settings);

        let http: Arc<dyn HttpTransport> = Arc::new(BlockingHttp::new()?);
        let mut ctx = Self::new(
            settings,
            layout,
            services,
            Arc::new(LocalLauncher::new()),
            http,
        );
        ctx.options = options;
        Ok(ctx)
    }

    /// Context from already-loaded parts with default options and timings
    pub fn new(
        settings: Settings,
        layout: ProjectLayout,
        services: Vec<ServiceDescriptor>,
        launcher: Arc<dyn Launcher>,
        http: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            settings,
            layout,
            services,
            launcher,
            http,
            options: DeployOptions::default(),
            timings: Timings::default(),
        }
    }

    /// Replace the command line flags
    pub fn with_options(mut self, options: DeployOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the waits and retry budgets
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// `docker-compose` commands against the generated compose file
    pub fn compose(&self) -> Compose {
        Compose::new(self.layout.compose_file(), &self.settings.project_name)
    }

    /// Client for the configured Vault
    pub fn secret_store(&self) -> SecretStore {
        SecretStore::new(
            self.settings.vault_addr(),
            &self.settings.vault_token,
            self.http.clone(),
        )
        .with_timeout(self.timings.vault_request_timeout)
    }

    /// Tunnel manager bound to this context's launcher and HTTP transport
    pub fn tunnels(&self) -> TunnelManager {
        TunnelManager::new(self.launcher.clone(), self.http.clone(), self.timings.clone())
    }

    /// Health verifier using `strategy`
    pub fn health_verifier(&self, strategy: ProbeStrategy) -> HealthVerifier {
        HealthVerifier::new(
            strategy,
            self.launcher.clone(),
            self.http.clone(),
            self.timings.clone(),
        )
    }

    /// Descriptor named `name`
    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedLauncher, ScriptedTransport, descriptor};

    #[test]
    fn test_immediate_timings_keep_budgets() {
        let timings = Timings::immediate();
        assert_eq!(timings.vault_poll_attempts, 30);
        assert_eq!(timings.rollout_timeout_secs, 120);
        assert!(timings.vault_poll_interval.is_zero());
        assert!(timings.tunnel_warmup.is_zero());
    }

    #[test]
    fn test_context_lookups() {
        let ctx = DeployContext::new(
            Settings::default(),
            ProjectLayout::new("/srv/terrarium"),
            vec![descriptor("logthon", &[]), descriptor("vault", &[])],
            Arc::new(ScriptedLauncher::new()),
            Arc::new(ScriptedTransport::new()),
        );

        assert!(ctx.service("logthon").is_some());
        assert!(ctx.service("ghost").is_none());
        assert_eq!(ctx.secret_store().address(), "http://localhost:8200");
        assert_eq!(
            ctx.compose().file(),
            std::path::Path::new("/srv/terrarium/configs/docker/docker-compose.yml")
        );
        assert!(ctx.options.build);
    }

    #[test]
    fn test_load_reads_settings_and_apps() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("apps/logthon");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(app.join("app-config.yml"), "name: logthon\nruntime:\n  port: 5000\n")
            .unwrap();
        std::fs::write(
            dir.path().join("terrarium-config.yml"),
            "project_name: demo\nnamespace: demo\n",
        )
        .unwrap();

        let ctx = DeployContext::load(
            dir.path(),
            DeployOptions {
                clean: true,
                build: false,
            },
        )
        .unwrap();

        assert_eq!(ctx.settings.project_name, "demo");
        assert_eq!(ctx.services.len(), 1);
        assert_eq!(ctx.services[0].runtime.port, 5000);
        assert!(ctx.options.clean);
        assert!(!ctx.options.build);
    }
}
