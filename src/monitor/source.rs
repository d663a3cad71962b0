//! Fingerprint sources: where the monitor reads existence and modification
//! state from.

use std::io;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use crate::error::MonitorError;
use crate::models::Host;
use crate::remote::{RemoteExecutor, RemoteSession};
use crate::system::quote;

/// Opaque modification marker. Two observations of an unchanged resource
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub String);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something the monitor can poll. `None` means the resource is absent.
#[allow(async_fn_in_trait)]
pub trait FingerprintSource {
    /// Human-readable name of the watched resource.
    fn describe(&self) -> String;

    async fn query(&self) -> Result<Option<Fingerprint>, MonitorError>;
}

/// A file on the local filesystem, fingerprinted by its mtime in nanoseconds.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalFile { path: path.into() }
    }
}

impl FingerprintSource for LocalFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn query(&self) -> Result<Option<Fingerprint>, MonitorError> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MonitorError::Fingerprint {
                    path: self.describe(),
                    reason: e.to_string(),
                })
            }
        };
        let modified = metadata.modified().map_err(|e| MonitorError::Fingerprint {
            path: self.describe(),
            reason: e.to_string(),
        })?;
        let nanos = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(Some(Fingerprint(nanos.to_string())))
    }
}

/// Marker printed by the remote probe when the file does not exist.
const ABSENT: &str = "absent";

/// A file on a remote host, fingerprinted by `stat -c %Y` (whole seconds).
pub struct RemoteFile<'a, S> {
    executor: &'a RemoteExecutor<S>,
    host: Host,
    path: String,
}

impl<'a, S: RemoteSession> RemoteFile<'a, S> {
    pub fn new(executor: &'a RemoteExecutor<S>, host: Host, path: impl Into<String>) -> Self {
        RemoteFile {
            executor,
            host,
            path: path.into(),
        }
    }

    /// Shell snippet printing either the mtime or [`ABSENT`].
    pub fn probe_command(&self) -> String {
        let path = quote(&self.path);
        format!(
            "if [ -e {p} ]; then stat -c %Y {p}; else echo {a}; fi",
            p = path,
            a = ABSENT
        )
    }
}

/// Interpret the output of [`RemoteFile::probe_command`].
pub fn parse_remote_fingerprint(
    path: &str,
    output: &str,
) -> Result<Option<Fingerprint>, MonitorError> {
    let value = output.trim();
    if value == ABSENT {
        return Ok(None);
    }
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(MonitorError::Fingerprint {
            path: path.to_string(),
            reason: format!("unexpected stat output '{}'", value),
        });
    }
    Ok(Some(Fingerprint(value.to_string())))
}

impl<'a, S: RemoteSession> FingerprintSource for RemoteFile<'a, S> {
    fn describe(&self) -> String {
        format!("{}:{}", self.host.role, self.path)
    }

    async fn query(&self) -> Result<Option<Fingerprint>, MonitorError> {
        let output = self.executor.query(&self.host, &self.probe_command()).await?;
        parse_remote_fingerprint(&self.describe(), &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::remote::{MockSession, SessionOutput};
    use tempfile::TempDir;

    #[test]
    fn test_parse_remote_fingerprint() {
        assert_eq!(parse_remote_fingerprint("p", "absent\n").unwrap(), None);
        assert_eq!(
            parse_remote_fingerprint("p", "1700000000\n").unwrap(),
            Some(Fingerprint("1700000000".into()))
        );
        assert!(matches!(
            parse_remote_fingerprint("p", "stat: cannot stat"),
            Err(MonitorError::Fingerprint { .. })
        ));
    }

    #[tokio::test]
    async fn test_local_file_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("probe.txt");
        let source = LocalFile::new(&path);

        assert_eq!(source.query().await.unwrap(), None);
        std::fs::write(&path, "x").unwrap();
        assert!(source.query().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remote_file_queries_edge() {
        let session =
            MockSession::new().respond(Role::Edge, "stat -c %Y", SessionOutput::ok("42\n"));
        let executor = RemoteExecutor::new(session);
        let edge = Host::new(Role::Edge, "10.0.0.4", "root");
        let source = RemoteFile::new(&executor, edge, "/cvmfs/software.example.org/probe.txt");

        assert_eq!(source.query().await.unwrap(), Some(Fingerprint("42".into())));
        assert!(executor.mutating_calls().is_empty());
    }
}
