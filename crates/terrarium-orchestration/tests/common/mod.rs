//! Common test utilities

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use terrarium_config::{ProjectLayout, ServiceDescriptor, Settings};
use terrarium_orchestration::testing::{ScriptedLauncher, ScriptedTransport};
use terrarium_orchestration::{DeployContext, DeployOptions, Timings};

pub const VAULT: &str = "http://localhost:8200";

/// A project directory holding certificates and generated configuration
pub struct Project {
    pub dir: TempDir,
    pub launcher: Arc<ScriptedLauncher>,
    pub transport: Arc<ScriptedTransport>,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "certs/edge-terrarium.crt", "CERT");
        write(dir.path(), "certs/edge-terrarium.key", "KEY");
        Self {
            dir,
            launcher: Arc::new(ScriptedLauncher::new()),
            transport: Arc::new(ScriptedTransport::new()),
        }
    }

    pub fn file(&self, relative: &str, content: &str) -> &Self {
        write(self.dir.path(), relative, content);
        self
    }

    pub fn path(&self, relative: &str) -> String {
        self.dir.path().join(relative).display().to_string()
    }

    pub fn context(&self, services: Vec<ServiceDescriptor>, options: DeployOptions) -> DeployContext {
        DeployContext::new(
            Settings::default(),
            ProjectLayout::new(self.dir.path()),
            services,
            self.launcher.clone(),
            self.transport.clone(),
        )
        .with_options(options)
        .with_timings(Timings::immediate())
    }

    /// Whether `line` was executed verbatim
    pub fn ran_exactly(&self, line: &str) -> bool {
        self.launcher.commands().iter().any(|c| c == line)
    }

    /// Index of the command executed verbatim as `line`
    pub fn index_of(&self, line: &str) -> usize {
        self.launcher
            .commands()
            .iter()
            .position(|c| c == line)
            .unwrap_or_else(|| panic!("`{}` was not executed", line))
    }
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}
