//! Credential fan-out: public keys generated on the authority are copied to
//! every host that has to verify what the authority publishes.

use regex::Regex;
use tempfile::TempDir;

use crate::error::OrchestratorError;
use crate::log_info;
use crate::models::{CredentialArtifact, ExecMode, Host};
use crate::remote::{RemoteExecutor, RemoteSession};
use crate::system::quote;

/// Naming convention of distributable public keys.
pub const PUBLIC_KEY_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*\.pub$";

/// Keep the public-key entries of a directory listing, in listing order.
pub fn select_public_keys(listing: &str) -> Result<Vec<String>, OrchestratorError> {
    let re = Regex::new(PUBLIC_KEY_PATTERN)
        .map_err(|e| OrchestratorError::Environment(e.to_string()))?;
    Ok(listing
        .lines()
        .map(str::trim)
        .filter(|name| re.is_match(name))
        .map(str::to_string)
        .collect())
}

pub struct KeyDistributor<'a, S> {
    executor: &'a RemoteExecutor<S>,
    key_dir: &'a str,
}

impl<'a, S: RemoteSession> KeyDistributor<'a, S> {
    pub fn new(executor: &'a RemoteExecutor<S>, key_dir: &'a str) -> Self {
        KeyDistributor { executor, key_dir }
    }

    fn key_path(&self, name: &str) -> String {
        format!("{}/{}", self.key_dir.trim_end_matches('/'), name)
    }

    /// Copy every public key in the authority's key directory to each
    /// dependent, into the same directory. Existing files are overwritten.
    /// A missing directory and an empty one are both environment errors.
    pub async fn distribute(
        &self,
        authority: &Host,
        dependents: &[&Host],
    ) -> Result<Vec<CredentialArtifact>, OrchestratorError> {
        let dir_check = format!("test -d {}", quote(self.key_dir));
        if !self.executor.probe(authority, &dir_check).await? {
            return Err(OrchestratorError::Environment(format!(
                "key directory {} does not exist on {}",
                self.key_dir, authority
            )));
        }
        let listing = self
            .executor
            .execute(authority, &format!("ls -1 {}", quote(self.key_dir)), ExecMode::Quiet)
            .await?;
        let names = select_public_keys(&listing.output)?;
        if names.is_empty() {
            return Err(OrchestratorError::Environment(format!(
                "no public keys found in {} on {}",
                self.key_dir, authority
            )));
        }
        log_info!(
            "[Keys] {} public key(s) on {}: {}",
            names.len(),
            authority.role,
            names.join(", ")
        );

        // Removed on drop, on every exit path.
        let staging = TempDir::new()?;
        let mut artifacts = Vec::with_capacity(names.len());

        for name in names {
            let origin = self.key_path(&name);
            let local = staging.path().join(&name);
            self.executor.fetch(authority, &origin, &local).await?;

            let mut destinations = Vec::with_capacity(dependents.len());
            for host in dependents {
                self.executor
                    .execute(host, &format!("mkdir -p {}", quote(self.key_dir)), ExecMode::Quiet)
                    .await?;
                self.executor.push(host, &local, &origin).await?;
                self.executor
                    .execute(host, &format!("chmod 0644 {}", quote(&origin)), ExecMode::Quiet)
                    .await?;
                log::debug!("[Keys] {} -> {}", name, host.role);
                destinations.push(format!("{}:{}", host.role, origin));
            }

            artifacts.push(CredentialArtifact {
                name,
                origin,
                destinations,
            });
        }

        Ok(artifacts)
    }
}
