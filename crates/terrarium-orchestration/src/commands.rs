//! Argument-vector builders for the external tools the backends drive

use command_executor::Command;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// `kubectl <args>`
pub fn kubectl<I, S>(args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::builder("kubectl").args(args).build()
}

/// `kubectl <args> -n <namespace>`
pub fn kubectl_in<I, S>(namespace: &str, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = kubectl(args);
    cmd.args(["-n", namespace]);
    cmd
}

/// `k3d <args>`
pub fn k3d<I, S>(args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::builder("k3d").args(args).build()
}

/// `docker <args>`
pub fn docker<I, S>(args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::builder("docker").args(args).build()
}

/// `kubectl apply -f <file>`
pub fn apply(file: &Path) -> Command {
    Command::builder("kubectl")
        .arg("apply")
        .arg("-f")
        .arg(file)
        .build()
}

/// `kubectl wait --for=condition=available --timeout=<secs>s deployment/<name> -n <ns>`
pub fn wait_available(namespace: &str, deployment: &str, timeout_secs: u64) -> Command {
    kubectl_in(
        namespace,
        [
            "wait".to_string(),
            "--for=condition=available".to_string(),
            format!("--timeout={}s", timeout_secs),
            format!("deployment/{}", deployment),
        ],
    )
}

/// `kubectl port-forward -n <ns> svc/<service> <local>:<remote>`
pub fn port_forward(namespace: &str, service: &str, local_port: u16, remote_port: u16) -> Command {
    kubectl([
        "port-forward".to_string(),
        "-n".to_string(),
        namespace.to_string(),
        format!("svc/{}", service),
        format!("{}:{}", local_port, remote_port),
    ])
}

/// `docker-compose -f <file> -p <project>` command factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compose {
    file: PathBuf,
    project: String,
}

impl Compose {
    /// Commands against `file` under compose project `project`
    pub fn new(file: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            project: project.into(),
        }
    }

    /// The compose file
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// `docker-compose -f <file> -p <project> <args>`
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::builder("docker-compose")
            .arg("-f")
            .arg(&self.file)
            .arg("-p")
            .arg(&self.project)
            .args(args)
            .build()
    }
}
