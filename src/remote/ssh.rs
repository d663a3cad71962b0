//! Production `RemoteSession` over the system `ssh`/`scp` clients.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{RemoteSession, SessionOutput};
use crate::error::RemoteError;
use crate::models::Host;
use crate::system::paths::known_hosts_path;

/// Shells out once per call. No multiplexing or connection reuse.
#[derive(Debug, Clone)]
pub struct SshSession {
    connect_timeout_secs: u64,
    known_hosts: PathBuf,
}

impl SshSession {
    pub fn new(connect_timeout_secs: u64, state_dir: &Path) -> Self {
        SshSession {
            connect_timeout_secs,
            known_hosts: known_hosts_path(state_dir),
        }
    }

    /// Options shared by `ssh` and `scp`. Interactive sessions may prompt,
    /// so they run without `BatchMode`.
    fn options(&self, batch: bool) -> Vec<String> {
        let mut opts = Vec::new();
        if batch {
            opts.push("-o".to_string());
            opts.push("BatchMode=yes".to_string());
        }
        opts.extend([
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".into(),
            "StrictHostKeyChecking=accept-new".into(),
            "-o".into(),
            format!("UserKnownHostsFile={}", self.known_hosts.display()),
        ]);
        opts
    }

    fn ensure_state_dir(&self) {
        if let Some(parent) = self.known_hosts.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("[Remote] cannot create {}: {}", parent.display(), e);
            }
        }
    }

    async fn capture(&self, program: &str, args: &[String]) -> Result<SessionOutput, RemoteError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RemoteError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(SessionOutput {
            exit_code: output.status.code(),
            output: combined.trim_end().to_string(),
        })
    }
}

impl RemoteSession for SshSession {
    async fn run(&self, host: &Host, command: &str) -> Result<SessionOutput, RemoteError> {
        self.ensure_state_dir();
        let mut args = self.options(true);
        args.push(host.destination());
        args.push(command.to_string());
        self.capture("ssh", &args).await
    }

    async fn copy_to(
        &self,
        host: &Host,
        local: &Path,
        remote: &str,
    ) -> Result<SessionOutput, RemoteError> {
        self.ensure_state_dir();
        let mut args = vec!["-q".to_string()];
        args.extend(self.options(true));
        args.push(local.display().to_string());
        args.push(format!("{}:{}", host.destination(), remote));
        self.capture("scp", &args).await
    }

    async fn copy_from(
        &self,
        host: &Host,
        remote: &str,
        local: &Path,
    ) -> Result<SessionOutput, RemoteError> {
        self.ensure_state_dir();
        let mut args = vec!["-q".to_string()];
        args.extend(self.options(true));
        args.push(format!("{}:{}", host.destination(), remote));
        args.push(local.display().to_string());
        self.capture("scp", &args).await
    }

    async fn run_local(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<SessionOutput, RemoteError> {
        self.capture(program, args).await
    }

    async fn interactive(&self, host: &Host) -> Result<Option<i32>, RemoteError> {
        self.ensure_state_dir();
        let mut args = vec!["-t".to_string()];
        args.extend(self.options(false));
        args.push(host.destination());

        let status = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| RemoteError::Spawn {
                program: "ssh".to_string(),
                source,
            })?;
        Ok(status.code())
    }

    async fn forget_host(&self, host: &Host) -> Result<(), RemoteError> {
        if !self.known_hosts.exists() {
            return Ok(());
        }
        let args = vec![
            "-R".to_string(),
            host.address.clone(),
            "-f".to_string(),
            self.known_hosts.display().to_string(),
        ];
        let out = self.capture("ssh-keygen", &args).await?;
        if !out.success() {
            log::debug!("[Remote] ssh-keygen -R {}: {}", host.address, out.output);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_options() {
        let session = SshSession::new(7, Path::new("/tmp/tierup-state"));
        let batch = session.options(true);
        assert!(batch.contains(&"BatchMode=yes".to_string()));
        assert!(batch.contains(&"ConnectTimeout=7".to_string()));
        assert!(batch
            .iter()
            .any(|o| o.starts_with("UserKnownHostsFile=/tmp/tierup-state")));

        let interactive = session.options(false);
        assert!(!interactive.contains(&"BatchMode=yes".to_string()));
        assert_eq!(interactive.len() % 2, 0);
    }
}
