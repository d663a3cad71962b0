//! Remote command execution.
//!
//! `RemoteSession` is the seam every remote action goes through. `SshSession`
//! is the production implementation that shells out to `ssh`/`scp`;
//! `MockSession` is the in-memory double that records calls and returns
//! scripted responses.
//!
//! `RemoteExecutor` sits on top of a session and gives commands their meaning:
//! `execute` treats a non-zero exit as a failure, `probe` treats it as a
//! negative answer. It also keeps a history of everything it issued, tagged
//! mutating or not, which is how tests check that a refused run touched
//! nothing.

pub mod mock;
pub mod ssh;

pub use mock::MockSession;
pub use ssh::SshSession;

use std::path::Path;
use std::sync::Mutex;
use tokio::time::Instant;

use crate::error::RemoteError;
use crate::models::{ExecMode, ExecutionResult, Host, Role};

/// Exit status `ssh` reserves for its own failures (refused, timed out,
/// authentication).
pub const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Raw result of one session operation, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionOutput {
    pub exit_code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

impl SessionOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        SessionOutput {
            exit_code: Some(0),
            output: output.into(),
        }
    }

    pub fn failed(code: i32, output: impl Into<String>) -> Self {
        SessionOutput {
            exit_code: Some(code),
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Transport to remote hosts. Every call stands alone: no connection is
/// reused between calls.
#[allow(async_fn_in_trait)]
pub trait RemoteSession {
    /// Run `command` through the login shell of `host`.
    async fn run(&self, host: &Host, command: &str) -> Result<SessionOutput, RemoteError>;

    /// Copy a local file to `remote` (relative paths resolve against the
    /// login home).
    async fn copy_to(&self, host: &Host, local: &Path, remote: &str)
        -> Result<SessionOutput, RemoteError>;

    /// Copy `remote` from `host` into the local file `local`.
    async fn copy_from(&self, host: &Host, remote: &str, local: &Path)
        -> Result<SessionOutput, RemoteError>;

    /// Run a program on the operator's machine (cloud CLI calls).
    async fn run_local(&self, program: &str, args: &[String]) -> Result<SessionOutput, RemoteError>;

    /// Attach the operator's terminal to a shell on `host`.
    async fn interactive(&self, host: &Host) -> Result<Option<i32>, RemoteError>;

    /// Drop any cached identity for `host` (its key changes on re-imaging).
    async fn forget_host(&self, _host: &Host) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Kind of operation recorded in the executor history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Probe,
    Execute,
    Push,
    Fetch,
    Local,
    Interactive,
}

impl CallKind {
    /// Whether this kind of call can change remote state.
    pub fn is_mutating(&self) -> bool {
        matches!(self, CallKind::Execute | CallKind::Push | CallKind::Local)
    }
}

/// One entry of the executor history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub kind: CallKind,
    /// `None` for local calls.
    pub role: Option<Role>,
    pub account: Option<String>,
    pub command: String,
}

/// Interprets session results and records every issued operation.
pub struct RemoteExecutor<S> {
    session: S,
    quiet: bool,
    history: Mutex<Vec<CallRecord>>,
}

impl<S: RemoteSession> RemoteExecutor<S> {
    pub fn new(session: S) -> Self {
        RemoteExecutor {
            session,
            quiet: false,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Suppress echoing of successful command output.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    fn record(&self, kind: CallKind, host: Option<&Host>, command: &str) {
        if let Ok(mut history) = self.history.lock() {
            history.push(CallRecord {
                kind,
                role: host.map(|h| h.role),
                account: host.map(|h| h.account.clone()),
                command: command.to_string(),
            });
        }
    }

    /// Snapshot of every operation issued so far.
    pub fn history(&self) -> Vec<CallRecord> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Operations that could have changed remote state.
    pub fn mutating_calls(&self) -> Vec<CallRecord> {
        self.history()
            .into_iter()
            .filter(|c| c.kind.is_mutating())
            .collect()
    }

    /// Run a command that must succeed.
    pub async fn execute(
        &self,
        host: &Host,
        command: &str,
        mode: ExecMode,
    ) -> Result<ExecutionResult, RemoteError> {
        self.record(CallKind::Execute, Some(host), command);
        log::debug!("[Remote] [{}] $ {}", host.role, command);

        let started = Instant::now();
        let raw = self.session.run(host, command).await?;
        let result = ExecutionResult {
            exit_code: raw.exit_code,
            output: raw.output,
            elapsed: started.elapsed(),
        };

        if !result.success() {
            log::debug!(
                "[Remote] [{}] command failed after {:?}",
                host.role,
                result.elapsed
            );
            return Err(RemoteError::CommandFailed {
                host: host.destination(),
                command: command.to_string(),
                code: exit_label(result.exit_code),
                output: result.output,
            });
        }

        self.emit(host, &result.output, mode);
        Ok(result)
    }

    /// Run a yes/no check. A non-zero remote exit means "no"; a transport
    /// failure is an error.
    pub async fn probe(&self, host: &Host, command: &str) -> Result<bool, RemoteError> {
        self.record(CallKind::Probe, Some(host), command);
        log::debug!("[Remote] [{}] ? {}", host.role, command);
        let raw = self.session.run(host, command).await?;
        match raw.exit_code {
            Some(0) => Ok(true),
            Some(SSH_TRANSPORT_FAILURE) | None => Err(RemoteError::Unreachable {
                host: host.destination(),
                output: raw.output,
            }),
            Some(_) => Ok(false),
        }
    }

    /// Run a read-only command and return its output. Recorded as a probe,
    /// but a non-zero exit is still a failure.
    pub async fn query(&self, host: &Host, command: &str) -> Result<String, RemoteError> {
        self.record(CallKind::Probe, Some(host), command);
        log::debug!("[Remote] [{}] ? {}", host.role, command);
        let raw = self.session.run(host, command).await?;
        if !raw.success() {
            return Err(RemoteError::CommandFailed {
                host: host.destination(),
                command: command.to_string(),
                code: exit_label(raw.exit_code),
                output: raw.output,
            });
        }
        Ok(raw.output)
    }

    /// Copy a local file onto `host`.
    pub async fn push(&self, host: &Host, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let label = format!("push {} -> {}", local.display(), remote);
        self.record(CallKind::Push, Some(host), &label);
        log::debug!("[Remote] [{}] {}", host.role, label);

        let raw = self.session.copy_to(host, local, remote).await?;
        if !raw.success() {
            return Err(RemoteError::Transfer {
                from: local.display().to_string(),
                to: format!("{}:{}", host.destination(), remote),
                output: raw.output,
            });
        }
        Ok(())
    }

    /// Copy a file from `host` to the local filesystem.
    pub async fn fetch(&self, host: &Host, remote: &str, local: &Path) -> Result<(), RemoteError> {
        let label = format!("fetch {} -> {}", remote, local.display());
        self.record(CallKind::Fetch, Some(host), &label);
        log::debug!("[Remote] [{}] {}", host.role, label);

        let raw = self.session.copy_from(host, remote, local).await?;
        if !raw.success() {
            return Err(RemoteError::Transfer {
                from: format!("{}:{}", host.destination(), remote),
                to: local.display().to_string(),
                output: raw.output,
            });
        }
        Ok(())
    }

    /// Run a local program that must succeed.
    pub async fn run_local(
        &self,
        program: &str,
        args: &[String],
        mode: ExecMode,
    ) -> Result<ExecutionResult, RemoteError> {
        let command = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.record(CallKind::Local, None, &command);
        log::debug!("[Local] $ {}", command);

        let started = Instant::now();
        let raw = self.session.run_local(program, args).await?;
        let result = ExecutionResult {
            exit_code: raw.exit_code,
            output: raw.output,
            elapsed: started.elapsed(),
        };
        if !result.success() {
            return Err(RemoteError::CommandFailed {
                host: "localhost".to_string(),
                command,
                code: exit_label(result.exit_code),
                output: result.output,
            });
        }
        if !self.quiet && mode == ExecMode::Echo {
            for line in result.output.lines() {
                log::info!("[Local] {}", line);
            }
        }
        Ok(result)
    }

    /// Hand the terminal over to an interactive shell on `host`.
    pub async fn interactive(&self, host: &Host) -> Result<(), RemoteError> {
        self.record(CallKind::Interactive, Some(host), "shell");
        match self.session.interactive(host).await? {
            Some(0) => Ok(()),
            code => Err(RemoteError::Interactive {
                host: host.destination(),
                code: exit_label(code),
            }),
        }
    }

    /// Forget the cached identity of `host`.
    pub async fn forget_host(&self, host: &Host) -> Result<(), RemoteError> {
        self.session.forget_host(host).await
    }

    fn emit(&self, host: &Host, output: &str, mode: ExecMode) {
        match mode {
            ExecMode::Quiet => {}
            ExecMode::Echo if !self.quiet => {
                for line in output.lines() {
                    log::info!("[{}] {}", host.role, line);
                }
            }
            _ => {
                for line in output.lines() {
                    log::debug!("[{}] {}", host.role, line);
                }
            }
        }
    }
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal".to_string(),
    }
}
