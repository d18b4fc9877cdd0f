//! Local process execution backend

use async_io::Timer;
use async_process::{Child, Stdio};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::launcher::Launcher;
use crate::process::{ExitResult, ExitStatus, ProcessHandle};

/// Launcher for executing processes on the local machine
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

impl LocalLauncher {
    /// Create a new local launcher
    pub fn new() -> Self {
        Self
    }
}

fn spawn_error(command: &Command, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::CommandNotFound {
            command: command.get_program().to_string_lossy().into_owned(),
        }
    } else {
        Error::spawn_failed(format!("{}: {}", command, err))
    }
}

#[async_trait]
impl Launcher for LocalLauncher {
    async fn execute(&self, command: &Command) -> Result<ExitResult> {
        debug!("Running: {}", command);

        let mut async_cmd = command.to_async();
        async_cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = async_cmd.output();
        let output = match command.get_timeout() {
            // Dropping the losing output future drops the child, which kills it.
            Some(limit) => {
                let bounded = futures_lite::future::or(
                    async { output.await.map(Some) },
                    async {
                        Timer::after(limit).await;
                        Ok(None)
                    },
                )
                .await
                .map_err(|e| spawn_error(command, e))?;

                bounded.ok_or_else(|| Error::TimedOut {
                    command: command.to_string(),
                    after: limit,
                })?
            }
            None => output.await.map_err(|e| spawn_error(command, e))?,
        };

        let result = ExitResult {
            status: output.status.into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(
            "{} exited with {:?} ({} bytes stdout, {} bytes stderr)",
            command,
            result.status.code,
            result.stdout.len(),
            result.stderr.len()
        );
        Ok(result)
    }

    async fn launch(&self, command: &Command) -> Result<Box<dyn ProcessHandle>> {
        debug!("Launching background process: {}", command);

        let mut async_cmd = command.to_async();
        async_cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        let child = async_cmd.spawn().map_err(|e| spawn_error(command, e))?;
        Ok(Box::new(LocalProcessHandle { child }))
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        let candidate = Path::new(program);
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }

        let search_path = std::env::var_os("PATH")?;
        std::env::split_paths(&search_path)
            .map(|dir| dir.join(program))
            .find(|path| is_executable(path))
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// A handle to control a local background process
pub struct LocalProcessHandle {
    /// The underlying child process
    child: Child,
}

impl LocalProcessHandle {
    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        use nix::unistd::Pid;

        let pid = Pid::from_raw(self.child.id() as i32);
        nix::sys::signal::kill(pid, signal)
            .map_err(|e| Error::signal_failed(signal as i32, e.to_string()))
    }
}

#[async_trait]
impl ProcessHandle for LocalProcessHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_status(), Ok(None))
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self
            .child
            .status()
            .await
            .map_err(|e| Error::spawn_failed(format!("Failed to wait for process: {}", e)))?;

        Ok(status.into())
    }

    async fn terminate(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            self.signal(nix::sys::signal::Signal::SIGTERM)
        }

        #[cfg(not(unix))]
        {
            self.child
                .kill()
                .map_err(|e| Error::signal_failed(-1, e.to_string()))
        }
    }

    async fn kill(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            self.signal(nix::sys::signal::Signal::SIGKILL)
        }

        #[cfg(not(unix))]
        {
            self.child
                .kill()
                .map_err(|e| Error::signal_failed(-1, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_finds_sh() {
        let launcher = LocalLauncher::new();
        let found = launcher.locate("sh").expect("sh should be on PATH");
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn test_locate_missing_program() {
        let launcher = LocalLauncher::new();
        assert!(launcher.locate("definitely-not-a-real-tool-xyz").is_none());
        assert!(launcher.locate("/nonexistent/dir/kubectl").is_none());
    }
}
