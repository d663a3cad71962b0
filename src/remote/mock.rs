//! In-memory `RemoteSession` for tests.
//!
//! Records every call and answers from scripted rules. It also keeps a tiny
//! per-role view of which remote paths exist so that `test -d`/`test -e`
//! probes behave like a real host: absent unless declared with
//! [`MockSession::with_path`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::{RemoteSession, SessionOutput};
use crate::error::RemoteError;
use crate::models::{Host, Role};

type Responder = Box<dyn Fn(&str) -> SessionOutput>;

struct Rule {
    role: Option<Role>,
    needle: String,
    respond: Responder,
}

/// A call observed by the mock, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Run { role: Role, account: String, command: String },
    CopyTo { role: Role, local: PathBuf, remote: String },
    CopyFrom { role: Role, remote: String, local: PathBuf },
    Local { program: String, args: Vec<String> },
    Interactive { role: Role },
    Forget { role: Role },
}

impl MockCall {
    /// Role this call was addressed to, `None` for local programs.
    pub fn role(&self) -> Option<Role> {
        match self {
            MockCall::Run { role, .. }
            | MockCall::CopyTo { role, .. }
            | MockCall::CopyFrom { role, .. }
            | MockCall::Interactive { role }
            | MockCall::Forget { role } => Some(*role),
            MockCall::Local { .. } => None,
        }
    }
}

#[derive(Default)]
pub struct MockSession {
    rules: Vec<Rule>,
    paths: HashSet<(Role, String)>,
    remote_files: HashMap<(Role, String), String>,
    latency: Duration,
    calls: Mutex<Vec<MockCall>>,
    pushed: Mutex<HashMap<(Role, String), String>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands on `role` containing `needle` with a fixed output.
    pub fn respond(self, role: Role, needle: &str, output: SessionOutput) -> Self {
        self.respond_with(Some(role), needle, move |_| output.clone())
    }

    /// Answer matching commands with a computed output. `role = None`
    /// matches every host. Earlier rules win.
    pub fn respond_with<F>(mut self, role: Option<Role>, needle: &str, respond: F) -> Self
    where
        F: Fn(&str) -> SessionOutput + 'static,
    {
        self.rules.push(Rule {
            role,
            needle: needle.to_string(),
            respond: Box::new(respond),
        });
        self
    }

    /// Declare that `path` exists on `role`.
    pub fn with_path(mut self, role: Role, path: &str) -> Self {
        self.paths.insert((role, path.to_string()));
        self
    }

    /// Declare a file that `copy_from` can fetch from `role`.
    pub fn with_remote_file(mut self, role: Role, path: &str, content: &str) -> Self {
        self.remote_files
            .insert((role, path.to_string()), content.to_string());
        self
    }

    /// Simulated round-trip time added to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Commands run on `role`, in order.
    pub fn commands_for(&self, role: Role) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Run { role: r, command, .. } if r == role => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Content of a file pushed to `role` at `remote`.
    pub fn pushed_file(&self, role: Role, remote: &str) -> Option<String> {
        self.pushed
            .lock()
            .ok()
            .and_then(|p| p.get(&(role, remote.to_string())).cloned())
    }

    fn record(&self, call: MockCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn scripted(&self, role: Role, command: &str) -> Option<SessionOutput> {
        self.rules
            .iter()
            .find(|r| r.role.map_or(true, |x| x == role) && command.contains(&r.needle))
            .map(|r| (r.respond)(command))
    }

    fn path_probe(&self, role: Role, command: &str) -> Option<SessionOutput> {
        let path = command
            .strip_prefix("test -d ")
            .or_else(|| command.strip_prefix("test -e "))?;
        let path = path.trim().trim_matches('\'');
        if self.paths.contains(&(role, path.to_string())) {
            Some(SessionOutput::ok(""))
        } else {
            Some(SessionOutput::failed(1, ""))
        }
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl RemoteSession for MockSession {
    async fn run(&self, host: &Host, command: &str) -> Result<SessionOutput, RemoteError> {
        self.record(MockCall::Run {
            role: host.role,
            account: host.account.clone(),
            command: command.to_string(),
        });
        self.delay().await;
        Ok(self
            .scripted(host.role, command)
            .or_else(|| self.path_probe(host.role, command))
            .unwrap_or_else(|| SessionOutput::ok("")))
    }

    async fn copy_to(
        &self,
        host: &Host,
        local: &Path,
        remote: &str,
    ) -> Result<SessionOutput, RemoteError> {
        self.record(MockCall::CopyTo {
            role: host.role,
            local: local.to_path_buf(),
            remote: remote.to_string(),
        });
        self.delay().await;
        if let Some(out) = self.scripted(host.role, &format!("copy_to {}", remote)) {
            return Ok(out);
        }
        let content = match std::fs::read(local) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => return Ok(SessionOutput::failed(1, e.to_string())),
        };
        if let Ok(mut pushed) = self.pushed.lock() {
            pushed.insert((host.role, remote.to_string()), content);
        }
        Ok(SessionOutput::ok(""))
    }

    async fn copy_from(
        &self,
        host: &Host,
        remote: &str,
        local: &Path,
    ) -> Result<SessionOutput, RemoteError> {
        self.record(MockCall::CopyFrom {
            role: host.role,
            remote: remote.to_string(),
            local: local.to_path_buf(),
        });
        self.delay().await;
        if let Some(out) = self.scripted(host.role, &format!("copy_from {}", remote)) {
            return Ok(out);
        }
        match self.remote_files.get(&(host.role, remote.to_string())) {
            Some(content) => match std::fs::write(local, content) {
                Ok(()) => Ok(SessionOutput::ok("")),
                Err(e) => Ok(SessionOutput::failed(1, e.to_string())),
            },
            None => Ok(SessionOutput::failed(
                1,
                format!("scp: {}: No such file or directory", remote),
            )),
        }
    }

    async fn run_local(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<SessionOutput, RemoteError> {
        self.record(MockCall::Local {
            program: program.to_string(),
            args: args.to_vec(),
        });
        self.delay().await;
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(self
            .rules
            .iter()
            .find(|r| r.role.is_none() && line.contains(&r.needle))
            .map(|r| (r.respond)(&line))
            .unwrap_or_else(|| SessionOutput::ok("")))
    }

    async fn interactive(&self, host: &Host) -> Result<Option<i32>, RemoteError> {
        self.record(MockCall::Interactive { role: host.role });
        Ok(Some(0))
    }

    async fn forget_host(&self, host: &Host) -> Result<(), RemoteError> {
        self.record(MockCall::Forget { role: host.role });
        Ok(())
    }
}
