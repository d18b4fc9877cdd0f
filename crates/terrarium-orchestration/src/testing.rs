//! Scripted doubles for the launcher and the HTTP transport
//!
//! Both doubles answer by prefix match on a rendered request line and record
//! everything they were asked to do, so a whole deploy can be replayed and
//! its command sequence asserted on.

use crate::http::{HttpRequest, HttpResponse, HttpTransport, Method};
use crate::{Error, Result};
use async_trait::async_trait;
use command_executor::{Command, ExitResult, ExitStatus, Launcher, ProcessHandle};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use terrarium_config::{ImageSource, Runtime, ServiceDescriptor};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Minimal prebuilt-image descriptor named `name` depending on `dependencies`
pub fn descriptor(name: &str, dependencies: &[&str]) -> ServiceDescriptor {
    ServiceDescriptor {
        name: name.to_string(),
        description: String::new(),
        image: ImageSource::Prebuilt {
            image_name: format!("edge-terrarium-{}", name),
            tag: "latest".to_string(),
        },
        runtime: Runtime {
            port: 8080,
            health_check_path: "/health".to_string(),
            startup_timeout: 30,
            port_forward: None,
        },
        routes: Vec::new(),
        dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        health_checks: BTreeMap::new(),
        volumes: Vec::new(),
        databases: Vec::new(),
        environment: Vec::new(),
    }
}

/// Replies for one prefix; the last reply repeats once the queue is drained
#[derive(Debug)]
struct Rule<T> {
    prefix: String,
    replies: VecDeque<T>,
}

#[derive(Debug)]
struct Script<T: Clone> {
    rules: Vec<Rule<T>>,
}

impl<T: Clone> Default for Script<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T: Clone> Script<T> {
    fn push(&mut self, prefix: &str, replies: Vec<T>) {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            replies: replies.into(),
        });
    }

    fn answer(&mut self, line: &str) -> Option<T> {
        // max_by_key keeps the last of equal keys, so later rules win ties.
        let rule = self
            .rules
            .iter_mut()
            .filter(|rule| line.starts_with(&rule.prefix))
            .max_by_key(|rule| rule.prefix.len())?;
        if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        }
    }
}

#[derive(Debug, Clone)]
enum LaunchReply {
    Exit(ExitResult),
    NotFound,
}

/// [`Launcher`] that answers from a script instead of running programs.
///
/// Unscripted commands succeed with empty output. The longest matching
/// prefix wins.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    script: Mutex<Script<LaunchReply>>,
    executed: Mutex<Vec<String>>,
    launched: Mutex<Vec<String>>,
    terminated: Arc<Mutex<Vec<String>>>,
    missing: Mutex<BTreeSet<String>>,
    next_pid: AtomicU32,
}

impl ScriptedLauncher {
    /// Launcher where every command succeeds silently
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to commands starting with `prefix`
    pub fn respond(&self, prefix: &str, result: ExitResult) -> &Self {
        lock(&self.script).push(prefix, vec![LaunchReply::Exit(result)]);
        self
    }

    /// Reply to successive matching commands in turn, repeating the last reply
    pub fn respond_sequence(&self, prefix: &str, results: Vec<ExitResult>) -> &Self {
        lock(&self.script).push(prefix, results.into_iter().map(LaunchReply::Exit).collect());
        self
    }

    /// Shorthand for a successful reply with `stdout`
    pub fn stdout(&self, prefix: &str, stdout: &str) -> &Self {
        self.respond(prefix, ExitResult::ok(stdout))
    }

    /// Shorthand for a failing reply with exit code 1 and `stderr`
    pub fn fail(&self, prefix: &str, stderr: &str) -> &Self {
        self.respond(prefix, ExitResult::failed(1, stderr))
    }

    /// Make `program` unknown to both `locate` and `execute`
    pub fn missing_tool(&self, program: &str) -> &Self {
        lock(&self.missing).insert(program.to_string());
        lock(&self.script).push(program, vec![LaunchReply::NotFound]);
        self
    }

    /// Every executed command line, in order
    pub fn commands(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    /// Every launched background command line, in order
    pub fn launched(&self) -> Vec<String> {
        lock(&self.launched).clone()
    }

    /// Background command lines whose handles were terminated or killed
    pub fn terminated(&self) -> Vec<String> {
        lock(&self.terminated).clone()
    }

    /// Whether any executed command starts with `prefix`
    pub fn ran(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }

    /// Index of the first executed command starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        lock(&self.executed)
            .iter()
            .position(|line| line.starts_with(prefix))
    }

    /// Number of executed commands starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        lock(&self.executed)
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn execute(&self, command: &Command) -> command_executor::Result<ExitResult> {
        let line = command.to_string();
        lock(&self.executed).push(line.clone());

        match lock(&self.script).answer(&line) {
            Some(LaunchReply::NotFound) => Err(command_executor::Error::CommandNotFound {
                command: command.get_program().to_string_lossy().into_owned(),
            }),
            Some(LaunchReply::Exit(result)) => Ok(result),
            None => Ok(ExitResult::ok("")),
        }
    }

    async fn launch(&self, command: &Command) -> command_executor::Result<Box<dyn ProcessHandle>> {
        let line = command.to_string();
        lock(&self.launched).push(line.clone());
        if let Some(LaunchReply::NotFound) = lock(&self.script).answer(&line) {
            return Err(command_executor::Error::CommandNotFound {
                command: command.get_program().to_string_lossy().into_owned(),
            });
        }

        let pid = 40_000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedProcess {
            pid,
            line,
            running: Arc::new(AtomicBool::new(true)),
            terminated: self.terminated.clone(),
        }))
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        if lock(&self.missing).contains(program) {
            None
        } else {
            Some(PathBuf::from("/usr/bin").join(program))
        }
    }
}

/// Background process handed out by [`ScriptedLauncher::launch`]
#[derive(Debug)]
pub struct ScriptedProcess {
    pid: u32,
    line: String,
    running: Arc<AtomicBool>,
    terminated: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProcess {
    fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            lock(&self.terminated).push(self.line.clone());
        }
    }
}

#[async_trait]
impl ProcessHandle for ScriptedProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_running(&mut self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn wait(&mut self) -> command_executor::Result<ExitStatus> {
        self.stop();
        Ok(ExitStatus::exited(0))
    }

    async fn terminate(&mut self) -> command_executor::Result<()> {
        self.stop();
        Ok(())
    }

    async fn kill(&mut self) -> command_executor::Result<()> {
        self.stop();
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum HttpReply {
    Response(HttpResponse),
    Fail(String),
}

/// [`HttpTransport`] that answers from a script.
///
/// Rules match on `"<METHOD> <url>"`; the longest matching prefix wins.
/// Unscripted requests fail as if the connection was refused.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<Script<HttpReply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn request_line(request: &HttpRequest) -> String {
    let method = match request.method {
        Method::Get => "GET",
        Method::Post => "POST",
    };
    format!("{} {}", method, request.url)
}

impl ScriptedTransport {
    /// Transport where every request is refused
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests starting with `prefix` with `status` and `body`
    pub fn respond(&self, prefix: &str, status: u16, body: &str) -> &Self {
        lock(&self.script).push(prefix, vec![HttpReply::Response(HttpResponse::new(status, body))]);
        self
    }

    /// Answer successive matching requests in turn, repeating the last
    pub fn respond_sequence(&self, prefix: &str, replies: Vec<(u16, &str)>) -> &Self {
        lock(&self.script).push(
            prefix,
            replies
                .into_iter()
                .map(|(status, body)| HttpReply::Response(HttpResponse::new(status, body)))
                .collect(),
        );
        self
    }

    /// Fail requests starting with `prefix` with a transport error
    pub fn fail(&self, prefix: &str, reason: &str) -> &Self {
        lock(&self.script).push(prefix, vec![HttpReply::Fail(reason.to_string())]);
        self
    }

    /// Answer the Vault endpoints used by a deploy under `base` with success
    pub fn healthy_vault(&self, base: &str) -> &Self {
        self.respond(
            &format!("GET {}/v1/sys/health", base),
            200,
            r#"{"initialized":true,"sealed":false,"standby":false,"version":"1.15.2","cluster_name":"vault-cluster-test"}"#,
        );
        self.respond(&format!("POST {}/v1/sys/mounts/secret", base), 204, "");
        self.respond(&format!("POST {}/v1/secret/data/", base), 200, "{}");
        self
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// `"<METHOD> <url>"` of every request received, in order
    pub fn request_lines(&self) -> Vec<String> {
        lock(&self.requests).iter().map(request_line).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let line = request_line(&request);
        lock(&self.requests).push(request);
        match lock(&self.script).answer(&line) {
            Some(HttpReply::Response(response)) => Ok(response),
            Some(HttpReply::Fail(reason)) => Err(Error::Http(format!("{}: {}", line, reason))),
            None => Err(Error::Http(format!("{}: connection refused", line))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_longest_prefix_wins_and_sequences_repeat() {
        let launcher = ScriptedLauncher::new();
        launcher.stdout("kubectl", "generic");
        launcher.respond_sequence(
            "kubectl get pods",
            vec![ExitResult::failed(1, "not yet"), ExitResult::ok("Running")],
        );

        let get = Command::builder("kubectl").args(["get", "pods"]).build();
        let other = Command::builder("kubectl").arg("version").build();

        assert!(!launcher.execute(&get).await.unwrap().success());
        assert_eq!(launcher.execute(&get).await.unwrap().stdout, "Running");
        assert_eq!(launcher.execute(&get).await.unwrap().stdout, "Running");
        assert_eq!(launcher.execute(&other).await.unwrap().stdout, "generic");
        assert_eq!(launcher.count("kubectl get pods"), 3);
    }

    #[smol_potat::test]
    async fn test_missing_tool() {
        let launcher = ScriptedLauncher::new();
        launcher.missing_tool("k3d");

        assert!(launcher.locate("k3d").is_none());
        assert!(launcher.locate("kubectl").is_some());
        let err = launcher
            .execute(&Command::new("k3d"))
            .await
            .unwrap_err();
        assert!(matches!(err, command_executor::Error::CommandNotFound { .. }));
    }

    #[smol_potat::test]
    async fn test_launched_process_records_termination() {
        let launcher = ScriptedLauncher::new();
        let cmd = Command::builder("kubectl").arg("port-forward").build();
        let mut handle = launcher.launch(&cmd).await.unwrap();

        assert!(handle.is_running());
        handle.terminate().await.unwrap();
        handle.kill().await.unwrap();
        assert!(!handle.is_running());
        assert_eq!(launcher.terminated(), vec!["kubectl port-forward"]);
    }

    #[smol_potat::test]
    async fn test_unscripted_request_is_refused() {
        let transport = ScriptedTransport::new();
        let err = transport
            .send(HttpRequest::get("http://localhost:1/health"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(transport.request_lines(), vec!["GET http://localhost:1/health"]);
    }
}
